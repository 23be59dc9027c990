use serde::{Deserialize, Serialize};
use thiserror::Error;
use tollgate_crypto::types::{short_hex, StdByteArray};

use super::{Address, Amount, UnitId};

fn unit_suffix(unit_id: &Option<UnitId>) -> String {
    match unit_id {
        Some(id) => format!(" (unit {id})"),
        None => String::new(),
    }
}

/// Every failure surfaced by the ledger host, its contracts and the client
/// helpers. Nothing here is retried automatically; the caller decides
/// whether to resubmit.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecutionError {
    /// Malformed or out-of-range input.
    #[error("{method}{}: invalid input: {reason}", unit_suffix(.unit_id))]
    Validation {
        method: String,
        unit_id: Option<UnitId>,
        reason: String,
    },
    /// The caller lacks the required ownership or signature.
    #[error("{method}{}: caller {} is not authorized: {reason}", unit_suffix(.unit_id), short_hex(.caller))]
    Authorization {
        method: String,
        unit_id: Option<UnitId>,
        caller: Address,
        reason: String,
    },
    /// Allowance, balance or deposit shortfall.
    #[error("{method}{}: insufficient funds, needed {needed}, available {available}", unit_suffix(.unit_id))]
    InsufficientFunds {
        method: String,
        unit_id: Option<UnitId>,
        needed: Amount,
        available: Amount,
    },
    #[error(transparent)]
    ChainState(#[from] ChainStateError),
    /// The host environment could not be reached or did not answer in time.
    #[error("network error: {0}")]
    Network(String),
}

/// Inconsistencies between a request and the current chain state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ChainStateError {
    #[error("nonce mismatch for {}: expected {expected}, got {actual}", short_hex(.sender))]
    NonceMismatch {
        sender: Address,
        expected: u64,
        actual: u64,
    },
    #[error("derived address {} does not match sender {}", short_hex(.derived), short_hex(.expected))]
    AddressMismatch { expected: Address, derived: Address },
    #[error("account {} is not deployed and no init code was supplied", short_hex(.0))]
    NotDeployed(Address),
    #[error("account {} is already deployed", short_hex(.0))]
    AlreadyDeployed(Address),
    #[error("no contract at {}", short_hex(.0))]
    NoContract(Address),
    #[error("contract at {} is not a {expected}", short_hex(.address))]
    WrongContract {
        address: Address,
        expected: String,
    },
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("unknown transaction {}", short_hex(.0))]
    UnknownTransaction(StdByteArray),
}

impl ExecutionError {
    pub fn validation(method: &str, reason: impl Into<String>) -> Self {
        ExecutionError::Validation {
            method: method.to_string(),
            unit_id: None,
            reason: reason.into(),
        }
    }

    pub fn authorization(method: &str, caller: Address, reason: impl Into<String>) -> Self {
        ExecutionError::Authorization {
            method: method.to_string(),
            unit_id: None,
            caller,
            reason: reason.into(),
        }
    }

    pub fn insufficient_funds(method: &str, needed: Amount, available: Amount) -> Self {
        ExecutionError::InsufficientFunds {
            method: method.to_string(),
            unit_id: None,
            needed,
            available,
        }
    }

    pub fn network(reason: impl Into<String>) -> Self {
        ExecutionError::Network(reason.into())
    }

    /// Attach the unit the failure relates to.
    pub fn for_unit(mut self, id: UnitId) -> Self {
        match &mut self {
            ExecutionError::Validation { unit_id, .. }
            | ExecutionError::Authorization { unit_id, .. }
            | ExecutionError::InsufficientFunds { unit_id, .. } => *unit_id = Some(id),
            _ => {}
        }
        self
    }

    /// Re-attribute a failure to the outer method that caused it, keeping
    /// the amounts and reasons.
    pub fn within(mut self, outer: &str) -> Self {
        match &mut self {
            ExecutionError::Validation { method, .. }
            | ExecutionError::Authorization { method, .. }
            | ExecutionError::InsufficientFunds { method, .. } => {
                *method = format!("{outer}/{method}");
            }
            _ => {}
        }
        self
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ExecutionError::Validation { .. })
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, ExecutionError::Authorization { .. })
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, ExecutionError::InsufficientFunds { .. })
    }

    pub fn is_chain_state(&self) -> bool {
        matches!(self, ExecutionError::ChainState(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ExecutionError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_in_messages() {
        let err = ExecutionError::insufficient_funds("transfer_from", 2, 1)
            .within("unlock")
            .for_unit(4);
        assert!(err.is_insufficient_funds());
        assert_eq!(
            err.to_string(),
            "unlock/transfer_from (unit 4): insufficient funds, needed 2, available 1"
        );

        let err: ExecutionError = ChainStateError::NonceMismatch {
            sender: [1u8; 32],
            expected: 3,
            actual: 5,
        }
        .into();
        assert!(err.is_chain_state());
        assert_eq!(err.to_string(), "nonce mismatch for 0x01010101..: expected 3, got 5");
    }
}
