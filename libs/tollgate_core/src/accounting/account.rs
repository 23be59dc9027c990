use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Amount};

/// Native balance and transaction count of an address. Contracts hold
/// native value in the same table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    // The address of the account is the public key
    pub address: Address,
    pub balance: Amount,
    // the number of transactions included from this account
    pub nonce: u64,
}

impl Account {
    pub fn new(address: Address, balance: Amount) -> Self {
        Account { address, balance, nonce: 0 }
    }
}

/// What a client knows about its smart account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartAccountStatus {
    pub owner: Address,
    /// Stable before and after deployment.
    pub address: Address,
    pub deployed: bool,
    /// Next operation nonce for key 0.
    pub nonce: u64,
}
