//! The in-process host chain.
pub mod chain;
