pub mod block;
pub mod calls;
pub mod errors;
pub mod events;
pub mod operation;
pub mod transaction;

use tollgate_crypto::types::{StdByteArray, ZERO_ARRAY};

/// Accounts and contracts are both addressed by 32 bytes. For external
/// accounts this is the ed25519 public key.
pub type Address = StdByteArray;
/// Token and native amounts.
pub type Amount = u128;
pub type UnitId = u64;

pub const ZERO_ADDRESS: Address = ZERO_ARRAY;
pub const GWEI: Amount = 1_000_000_000;
