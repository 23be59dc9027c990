//! The typed call schema.
//!
//! Every contract method is one enum variant with its parameters in order.
//! `Call::encode` and `Call::decode` are the only place call payloads are
//! turned into bytes and back; transactions and smart account operations
//! carry the encoded form.

use serde::{Deserialize, Serialize};
use tollgate_crypto::types::StdByteArray;

use crate::{
    contracts::{access_ledger::UnitParams, entry_point::DepositInfo},
    protocol::serialization::TollSerialize,
};

use super::{errors::ExecutionError, operation::Operation, Address, Amount, UnitId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    Ledger(LedgerCall),
    Token(TokenCall),
    Account(AccountCall),
    Factory(FactoryCall),
    EntryPoint(EntryPointCall),
    Paymaster(PaymasterCall),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCall {
    Create { metadata_uri: String },
    SetParams { unit_id: UnitId, cost: Amount, token: Address },
    Unlock { unit_id: UnitId },
    Withdraw { unit_id: UnitId, to: Address },
    TransferUnit { unit_id: UnitId, to: Address },
    IsUser { unit_id: UnitId, user: Address },
    GetParams { unit_id: UnitId },
    GetPaymentDate { unit_id: UnitId, user: Address },
    OwnerOf { unit_id: UnitId },
    MetadataUri { unit_id: UnitId },
    NextUnitId,
    UnitsOf { owner: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenCall {
    Transfer { to: Address, amount: Amount },
    Approve { spender: Address, amount: Amount },
    TransferFrom { from: Address, to: Address, amount: Amount },
    /// Faucet: mints to the caller.
    Mint { amount: Amount },
    BalanceOf { owner: Address },
    Allowance { owner: Address, spender: Address },
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCall {
    /// `data` is an encoded [`Call`] forwarded to `target`.
    Execute { target: Address, value: Amount, data: Vec<u8> },
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryCall {
    CreateAccount { owner: Address, salt: u64 },
    GetAddress { owner: Address, salt: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPointCall {
    HandleOps { ops: Vec<Operation>, beneficiary: Address },
    DepositTo { account: Address },
    GetDepositInfo { account: Address },
    GetNonce { sender: Address, key: u64 },
    GetOperationHash { op: Operation },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymasterCall {
    SetPaused { paused: bool },
    IsPaused,
}

impl TollSerialize for Call {}

impl Call {
    pub fn encode(&self) -> Result<Vec<u8>, ExecutionError> {
        self.serialize_toll()
            .map_err(|e| ExecutionError::validation(self.name(), format!("cannot encode call: {e}")))
    }

    /// Malformed payloads are a validation failure of whoever received them.
    pub fn decode(data: &[u8]) -> Result<Self, ExecutionError> {
        Self::deserialize_toll(data)
            .map_err(|e| ExecutionError::validation("decode", format!("malformed call data: {e}")))
    }

    /// The method name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Ledger(call) => match call {
                LedgerCall::Create { .. } => "create",
                LedgerCall::SetParams { .. } => "set_params",
                LedgerCall::Unlock { .. } => "unlock",
                LedgerCall::Withdraw { .. } => "withdraw",
                LedgerCall::TransferUnit { .. } => "transfer_unit",
                LedgerCall::IsUser { .. } => "is_user",
                LedgerCall::GetParams { .. } => "get_params",
                LedgerCall::GetPaymentDate { .. } => "get_payment_date",
                LedgerCall::OwnerOf { .. } => "owner_of",
                LedgerCall::MetadataUri { .. } => "metadata_uri",
                LedgerCall::NextUnitId => "next_unit_id",
                LedgerCall::UnitsOf { .. } => "units_of",
            },
            Call::Token(call) => match call {
                TokenCall::Transfer { .. } => "transfer",
                TokenCall::Approve { .. } => "approve",
                TokenCall::TransferFrom { .. } => "transfer_from",
                TokenCall::Mint { .. } => "mint",
                TokenCall::BalanceOf { .. } => "balance_of",
                TokenCall::Allowance { .. } => "allowance",
                TokenCall::Symbol => "symbol",
            },
            Call::Account(call) => match call {
                AccountCall::Execute { .. } => "execute",
                AccountCall::Owner => "owner",
            },
            Call::Factory(call) => match call {
                FactoryCall::CreateAccount { .. } => "create_account",
                FactoryCall::GetAddress { .. } => "get_address",
            },
            Call::EntryPoint(call) => match call {
                EntryPointCall::HandleOps { .. } => "handle_ops",
                EntryPointCall::DepositTo { .. } => "deposit_to",
                EntryPointCall::GetDepositInfo { .. } => "get_deposit_info",
                EntryPointCall::GetNonce { .. } => "get_nonce",
                EntryPointCall::GetOperationHash { .. } => "get_operation_hash",
            },
            Call::Paymaster(call) => match call {
                PaymasterCall::SetPaused { .. } => "set_paused",
                PaymasterCall::IsPaused => "is_paused",
            },
        }
    }

    /// Views never change state and may be answered without a transaction.
    pub fn is_view(&self) -> bool {
        matches!(
            self,
            Call::Ledger(
                LedgerCall::IsUser { .. }
                    | LedgerCall::GetParams { .. }
                    | LedgerCall::GetPaymentDate { .. }
                    | LedgerCall::OwnerOf { .. }
                    | LedgerCall::MetadataUri { .. }
                    | LedgerCall::NextUnitId
                    | LedgerCall::UnitsOf { .. }
            ) | Call::Token(
                TokenCall::BalanceOf { .. } | TokenCall::Allowance { .. } | TokenCall::Symbol
            ) | Call::Account(AccountCall::Owner)
                | Call::Factory(FactoryCall::GetAddress { .. })
                | Call::EntryPoint(
                    EntryPointCall::GetDepositInfo { .. }
                        | EntryPointCall::GetNonce { .. }
                        | EntryPointCall::GetOperationHash { .. }
                )
                | Call::Paymaster(PaymasterCall::IsPaused)
        )
    }

    /// Only payable methods accept native value.
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            Call::EntryPoint(EntryPointCall::DepositTo { .. }) | Call::Account(AccountCall::Execute { .. })
        )
    }
}

/// Return values of contract methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Empty,
    UnitId(UnitId),
    Bool(bool),
    Amount(Amount),
    Timestamp(u64),
    Params(UnitParams),
    Address(Address),
    Text(String),
    Units(Vec<UnitId>),
    Deposit(DepositInfo),
    Nonce(u64),
    Hash(StdByteArray),
}

macro_rules! response_accessors {
    ($($fn_name:ident => $variant:ident($ty:ty)),* $(,)?) => {
        impl Response {
            $(
                pub fn $fn_name(self) -> Result<$ty, ExecutionError> {
                    match self {
                        Response::$variant(value) => Ok(value),
                        other => Err(ExecutionError::validation(
                            "response",
                            format!("expected {}, got {:?}", stringify!($variant), other),
                        )),
                    }
                }
            )*
        }
    };
}

response_accessors! {
    into_unit_id => UnitId(UnitId),
    into_bool => Bool(bool),
    into_amount => Amount(Amount),
    into_timestamp => Timestamp(u64),
    into_params => Params(UnitParams),
    into_address => Address(Address),
    into_text => Text(String),
    into_units => Units(Vec<UnitId>),
    into_deposit => Deposit(DepositInfo),
    into_nonce => Nonce(u64),
    into_hash => Hash(StdByteArray),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Call::decode(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_nested_call_survives_encoding() {
        let inner = Call::Ledger(LedgerCall::SetParams { unit_id: 0, cost: 2, token: [3u8; 32] });
        let outer = Call::Account(AccountCall::Execute {
            target: [4u8; 32],
            value: 0,
            data: inner.encode().unwrap(),
        });
        let decoded = Call::decode(&outer.encode().unwrap()).unwrap();
        let Call::Account(AccountCall::Execute { data, .. }) = decoded else {
            panic!("wrong variant");
        };
        assert_eq!(Call::decode(&data).unwrap(), inner);
        assert_eq!(inner.name(), "set_params");
    }

    #[test]
    fn test_view_and_payable_classification() {
        assert!(Call::Ledger(LedgerCall::IsUser { unit_id: 0, user: [0u8; 32] }).is_view());
        assert!(!Call::Ledger(LedgerCall::Unlock { unit_id: 0 }).is_view());
        assert!(Call::EntryPoint(EntryPointCall::DepositTo { account: [0u8; 32] }).is_payable());
        assert!(!Call::Token(TokenCall::Mint { amount: 1 }).is_payable());
    }

    #[test]
    fn test_response_accessors() {
        assert_eq!(Response::UnitId(3).into_unit_id().unwrap(), 3);
        assert!(Response::Bool(true).into_unit_id().unwrap_err().is_validation());
    }
}
