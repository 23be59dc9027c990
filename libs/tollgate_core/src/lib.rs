pub mod accounting;
pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod nodes;
pub mod persistence;
pub mod primitives;
pub mod protocol;
