use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tollgate_crypto::types::short_hex;

use crate::{
    accounting::account::Account,
    contracts::{self, CallContext, Contract, ContractKind},
    primitives::{
        calls::{Call, Response},
        errors::{ChainStateError, ExecutionError},
        events::{Event, Log},
        Address, Amount, ZERO_ADDRESS,
    },
};

/// Nested calls deeper than this fail.
pub const MAX_CALL_DEPTH: usize = 16;

/// Block values visible to contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEnv {
    pub height: u64,
    pub timestamp: u64,
    pub base_fee: Amount,
}

/// Everything the chain knows: native accounts, contract storage and the
/// environment of the block being built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    accounts: BTreeMap<Address, Account>,
    contracts: BTreeMap<Address, Contract>,
    env: BlockEnv,
    // events of the call in progress
    #[serde(skip)]
    logs: Vec<Log>,
    #[serde(skip)]
    depth: usize,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(&self) -> BlockEnv {
        self.env
    }

    pub fn set_env(&mut self, env: BlockEnv) {
        self.env = env;
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    fn account_mut(&mut self, address: &Address) -> &mut Account {
        self.accounts
            .entry(*address)
            .or_insert_with(|| Account::new(*address, 0))
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.account(address).map(|account| account.balance).unwrap_or(0)
    }

    /// The transaction count of an external account.
    pub fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map(|account| account.nonce).unwrap_or(0)
    }

    pub fn increment_nonce(&mut self, address: &Address) {
        self.account_mut(address).nonce += 1;
    }

    pub fn credit(&mut self, address: &Address, amount: Amount) -> Result<(), ExecutionError> {
        let account = self.account_mut(address);
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| ExecutionError::validation("credit", "balance overflow"))?;
        Ok(())
    }

    pub fn debit(&mut self, address: &Address, amount: Amount, method: &str) -> Result<(), ExecutionError> {
        let available = self.balance(address);
        if available < amount {
            return Err(ExecutionError::insufficient_funds(method, amount, available));
        }
        self.account_mut(address).balance = available - amount;
        Ok(())
    }

    /// Move native value between two addresses.
    pub fn transfer_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
        method: &str,
    ) -> Result<(), ExecutionError> {
        if amount == 0 {
            return Ok(());
        }
        if *to == ZERO_ADDRESS {
            return Err(ExecutionError::validation(method, "native transfer to the zero address"));
        }
        self.debit(from, amount, method)?;
        self.credit(to, amount)
    }

    pub fn has_code(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    /// Place a contract at `address`. An address holds code at most once.
    pub fn install(&mut self, address: Address, contract: impl Into<Contract>) -> Result<(), ExecutionError> {
        if self.has_code(&address) {
            return Err(ChainStateError::AlreadyDeployed(address).into());
        }
        let contract = contract.into();
        tracing::debug!("installing {} at {}", contract.kind_name(), short_hex(&address));
        self.contracts.insert(address, contract);
        Ok(())
    }

    pub fn contract<T: ContractKind>(&self, address: &Address) -> Result<&T, ExecutionError> {
        let contract = self
            .contracts
            .get(address)
            .ok_or(ChainStateError::NoContract(*address))?;
        T::from_contract(contract).ok_or_else(|| {
            ChainStateError::WrongContract { address: *address, expected: T::NAME.to_string() }.into()
        })
    }

    pub fn contract_mut<T: ContractKind>(&mut self, address: &Address) -> Result<&mut T, ExecutionError> {
        let contract = self
            .contracts
            .get_mut(address)
            .ok_or(ChainStateError::NoContract(*address))?;
        T::from_contract_mut(contract).ok_or_else(|| {
            ChainStateError::WrongContract { address: *address, expected: T::NAME.to_string() }.into()
        })
    }

    pub fn emit(&mut self, emitter: Address, event: Event) {
        tracing::debug!("event from {}: {:?}", short_hex(&emitter), event);
        self.logs.push(Log { emitter, event });
    }

    /// Drain the events collected since the last call.
    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.logs)
    }

    /// Call `target` as `caller`, moving `value` natively first. State
    /// changes are not rolled back on failure; see [`Self::call_or_revert`].
    pub fn call(
        &mut self,
        caller: Address,
        target: Address,
        value: Amount,
        call: &Call,
    ) -> Result<Response, ExecutionError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ChainStateError::CallDepthExceeded(MAX_CALL_DEPTH).into());
        }
        if !self.has_code(&target) {
            return Err(ChainStateError::NoContract(target).into());
        }
        if value > 0 {
            if !call.is_payable() {
                return Err(ExecutionError::validation(call.name(), "method does not accept value"));
            }
            self.transfer_native(&caller, &target, value, call.name())?;
        }
        tracing::trace!(
            "call {} on {} from {} (depth {})",
            call.name(),
            short_hex(&target),
            short_hex(&caller),
            self.depth
        );
        let ctx = CallContext { caller, this: target, value, timestamp: self.env.timestamp };
        self.depth += 1;
        let result = contracts::dispatch(self, &ctx, call);
        self.depth -= 1;
        result
    }

    /// Like [`Self::call`], but a failure leaves the state exactly as it was.
    pub fn call_or_revert(
        &mut self,
        caller: Address,
        target: Address,
        value: Amount,
        call: &Call,
    ) -> Result<Response, ExecutionError> {
        let snapshot = self.clone();
        let result = self.call(caller, target, value, call);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    /// Answer a read-only call against a scratch copy.
    pub fn view(&self, target: &Address, call: &Call) -> Result<Response, ExecutionError> {
        if !call.is_view() {
            return Err(ExecutionError::validation(call.name(), "not a view method"));
        }
        let mut scratch = self.clone();
        scratch.logs.clear();
        scratch.call(ZERO_ADDRESS, *target, 0, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contracts::{access_ledger::AccessLedger, token::Token},
        primitives::calls::{LedgerCall, TokenCall},
    };

    #[test]
    fn test_native_transfers() {
        let mut state = WorldState::new();
        let (alice, bob) = ([1u8; 32], [2u8; 32]);
        state.credit(&alice, 10).unwrap();

        state.transfer_native(&alice, &bob, 4, "transfer").unwrap();
        assert_eq!(state.balance(&alice), 6);
        assert_eq!(state.balance(&bob), 4);

        let err = state.transfer_native(&alice, &bob, 7, "transfer").unwrap_err();
        assert!(err.is_insufficient_funds());
        assert_eq!(state.balance(&alice), 6);
    }

    #[test]
    fn test_typed_contract_access() {
        let mut state = WorldState::new();
        state.install([3u8; 32], Token::new("TOLL")).unwrap();

        assert!(state.contract::<Token>(&[3u8; 32]).is_ok());
        let err = state.contract::<AccessLedger>(&[3u8; 32]).unwrap_err();
        assert!(matches!(err, ExecutionError::ChainState(ChainStateError::WrongContract { .. })));
        let err = state.contract::<Token>(&[4u8; 32]).unwrap_err();
        assert!(matches!(err, ExecutionError::ChainState(ChainStateError::NoContract(_))));

        let err = state.install([3u8; 32], AccessLedger::default()).unwrap_err();
        assert!(matches!(err, ExecutionError::ChainState(ChainStateError::AlreadyDeployed(_))));
    }

    #[test]
    fn test_failed_call_reverts() {
        let mut state = WorldState::new();
        let token = [3u8; 32];
        let user = [1u8; 32];
        state.install(token, Token::new("TOLL")).unwrap();
        state.call_or_revert(user, token, 0, &Call::Token(TokenCall::Mint { amount: 5 })).unwrap();
        state.take_logs();

        let before = state.clone();
        let err = state
            .call_or_revert(user, token, 0, &Call::Token(TokenCall::Transfer { to: [2u8; 32], amount: 6 }))
            .unwrap_err();
        assert!(err.is_insufficient_funds());
        assert_eq!(state, before);
    }

    #[test]
    fn test_value_requires_payable_method() {
        let mut state = WorldState::new();
        let ledger = [3u8; 32];
        let user = [1u8; 32];
        state.install(ledger, AccessLedger::default()).unwrap();
        state.credit(&user, 100).unwrap();

        let call = Call::Ledger(LedgerCall::Create { metadata_uri: "ipfs://1".into() });
        let err = state.call_or_revert(user, ledger, 1, &call).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(state.balance(&user), 100);
    }

    #[test]
    fn test_call_depth_is_limited() {
        let mut state = WorldState::new();
        let (token, ledger) = ([3u8; 32], [4u8; 32]);
        let (owner, user) = ([1u8; 32], [2u8; 32]);
        state.install(token, Token::new("TOLL")).unwrap();
        state.install(ledger, AccessLedger::default()).unwrap();
        state.call(owner, ledger, 0, &Call::Ledger(LedgerCall::Create { metadata_uri: "ipfs://1".into() })).unwrap();
        state.call(owner, ledger, 0, &Call::Ledger(LedgerCall::SetParams { unit_id: 0, cost: 2, token })).unwrap();
        state.call(user, token, 0, &Call::Token(TokenCall::Mint { amount: 5 })).unwrap();
        state.call(user, token, 0, &Call::Token(TokenCall::Approve { spender: ledger, amount: 5 })).unwrap();
        state.take_logs();

        // the ledger still runs, its nested token call does not
        state.depth = MAX_CALL_DEPTH - 1;
        let before = state.clone();
        let unlock = Call::Ledger(LedgerCall::Unlock { unit_id: 0 });
        let err = state.call_or_revert(user, ledger, 0, &unlock).unwrap_err();
        assert_eq!(err, ExecutionError::ChainState(ChainStateError::CallDepthExceeded(MAX_CALL_DEPTH)));
        assert_eq!(state, before);

        state.depth = MAX_CALL_DEPTH;
        let err = state.call(user, token, 0, &Call::Token(TokenCall::Mint { amount: 1 })).unwrap_err();
        assert_eq!(err, ExecutionError::ChainState(ChainStateError::CallDepthExceeded(MAX_CALL_DEPTH)));

        state.depth = 0;
        state.call_or_revert(user, ledger, 0, &unlock).unwrap();
        assert_eq!(state.contract::<AccessLedger>(&ledger).unwrap().unit("get_params", 0).unwrap().params.balance, 2);
    }

    #[test]
    fn test_view_rejects_writes() {
        let mut state = WorldState::new();
        state.install([3u8; 32], AccessLedger::default()).unwrap();
        let call = Call::Ledger(LedgerCall::Create { metadata_uri: "ipfs://1".into() });
        assert!(state.view(&[3u8; 32], &call).unwrap_err().is_validation());
        let next = state.view(&[3u8; 32], &Call::Ledger(LedgerCall::NextUnitId)).unwrap();
        assert_eq!(next, Response::UnitId(0));
    }
}
