//! Client side of the protocol: genesis, address resolution, operation
//! building and transaction submission against a [`crate::nodes::node::Node`].
pub mod genesis;
pub mod operations;
pub mod resolver;
pub mod serialization;
pub mod transactions;
