use serde::{Deserialize, Serialize};
use tollgate_crypto::types::StdByteArray;

use super::{errors::ExecutionError, Address, Amount, UnitId};

/// Events emitted by contracts during a call. They are collected into the
/// receipt of the transaction and dropped if the call reverts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // access ledger
    UnitCreated { unit_id: UnitId, owner: Address, metadata_uri: String },
    ParamsSet { unit_id: UnitId, cost: Amount, token: Address },
    Unlocked { unit_id: UnitId, user: Address, cost: Amount, timestamp: u64 },
    Withdrawn { unit_id: UnitId, to: Address, amount: Amount },
    UnitTransferred { unit_id: UnitId, from: Address, to: Address },
    // token
    Transfer { from: Address, to: Address, amount: Amount },
    Approval { owner: Address, spender: Address, amount: Amount },
    // account abstraction
    AccountDeployed { account: Address, owner: Address, factory: Address },
    Deposited { account: Address, amount: Amount, total: Amount },
    OperationExecuted {
        operation_hash: StdByteArray,
        sender: Address,
        paymaster: Option<Address>,
        nonce: u64,
        success: bool,
        actual_gas_cost: Amount,
        revert_reason: Option<ExecutionError>,
    },
    PaymasterPaused { paused: bool },
}

/// An event together with the contract that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub emitter: Address,
    pub event: Event,
}
