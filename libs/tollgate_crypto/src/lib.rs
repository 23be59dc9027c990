//! Cryptographic primitives used by the Tollgate ledger.
//!
//! This crate provides small, focused building blocks:
//! - Hashing traits and a SHA3-256 default hasher with domain separation
//! - Signing/verification (ed25519) abstractions and defaults
//! - Fixed-size byte array types used across the project
//!
//! None of the public APIs in this crate perform network or filesystem I/O.

/// Reusable hashing traits and a default SHA3-256 hasher.
pub mod hashing;
/// Signature traits and default ed25519 signer/verifier.
pub mod signing;
/// Common type aliases and constants used by this crate.
pub mod types;
