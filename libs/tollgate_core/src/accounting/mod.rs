//! External accounts, wallets, and the world state every call runs against.
pub mod account;
pub mod wallet;
pub mod state;
