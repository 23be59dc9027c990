//! The singleton router for smart account operations.
//!
//! `handle_ops` walks a batch in order. For each operation it deploys the
//! sender if needed, checks the owner signature and the nonce, reserves
//! the worst-case gas cost from the payer's deposit, runs the call and
//! finally charges what was used. A failure before the call aborts the
//! whole batch; a failure of the call itself only undoes the call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tollgate_crypto::types::short_hex;

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{Call, EntryPointCall, FactoryCall, Response},
        errors::{ChainStateError, ExecutionError},
        events::Event,
        operation::Operation,
        Address, Amount, ZERO_ADDRESS,
    },
};

use super::{paymaster::Paymaster, smart_account::SmartAccount, CallContext};

/// Gas for signature and nonce checks.
pub const VALIDATION_GAS: u64 = 35_000;
/// Extra verification gas when the sender is deployed by the operation.
pub const DEPLOYMENT_GAS: u64 = 250_000;
pub const CALL_BASE_GAS: u64 = 21_000;
pub const CALL_DATA_BYTE_GAS: u64 = 16;

/// Gas used by executing `call_data`.
pub fn call_gas(call_data: &[u8]) -> u64 {
    CALL_BASE_GAS.saturating_add(CALL_DATA_BYTE_GAS.saturating_mul(call_data.len() as u64))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositInfo {
    pub deposit: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    chain_id: u64,
    // (sender, key) -> next sequence number
    nonces: BTreeMap<(Address, u64), u64>,
    // backed one to one by the native balance of the entry point
    deposits: BTreeMap<Address, Amount>,
}

impl EntryPoint {
    pub fn new(chain_id: u64) -> Self {
        EntryPoint { chain_id, nonces: BTreeMap::new(), deposits: BTreeMap::new() }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self, sender: &Address, key: u64) -> u64 {
        self.nonces.get(&(*sender, key)).copied().unwrap_or(0)
    }

    pub fn deposit_of(&self, account: &Address) -> Amount {
        self.deposits.get(account).copied().unwrap_or(0)
    }

    /// Consume `nonce` if it is exactly the next one.
    fn use_nonce(&mut self, sender: &Address, key: u64, nonce: u64) -> Result<(), ExecutionError> {
        let expected = self.nonce(sender, key);
        if nonce != expected {
            return Err(ChainStateError::NonceMismatch { sender: *sender, expected, actual: nonce }.into());
        }
        self.nonces.insert((*sender, key), expected + 1);
        Ok(())
    }

    fn credit_deposit(&mut self, account: &Address, amount: Amount) -> Result<Amount, ExecutionError> {
        let total = self
            .deposit_of(account)
            .checked_add(amount)
            .ok_or_else(|| ExecutionError::validation("deposit_to", "deposit overflow"))?;
        self.deposits.insert(*account, total);
        Ok(total)
    }

    fn debit_deposit(&mut self, account: &Address, amount: Amount) -> Result<(), ExecutionError> {
        let available = self.deposit_of(account);
        if available < amount {
            return Err(ExecutionError::insufficient_funds("handle_ops", amount, available));
        }
        self.deposits.insert(*account, available - amount);
        Ok(())
    }
}

pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &EntryPointCall) -> Result<Response, ExecutionError> {
    match call {
        EntryPointCall::HandleOps { ops, beneficiary } => handle_ops(state, ctx, ops, beneficiary),
        EntryPointCall::DepositTo { account } => {
            // the value already moved to this contract
            let total = state.contract_mut::<EntryPoint>(&ctx.this)?.credit_deposit(account, ctx.value)?;
            state.emit(ctx.this, Event::Deposited { account: *account, amount: ctx.value, total });
            Ok(Response::Deposit(DepositInfo { deposit: total }))
        }
        EntryPointCall::GetDepositInfo { account } => {
            let deposit = state.contract::<EntryPoint>(&ctx.this)?.deposit_of(account);
            Ok(Response::Deposit(DepositInfo { deposit }))
        }
        EntryPointCall::GetNonce { sender, key } => {
            Ok(Response::Nonce(state.contract::<EntryPoint>(&ctx.this)?.nonce(sender, *key)))
        }
        EntryPointCall::GetOperationHash { op } => {
            let chain_id = state.contract::<EntryPoint>(&ctx.this)?.chain_id();
            Ok(Response::Hash(op.hash(&ctx.this, chain_id)))
        }
    }
}

#[tracing::instrument(level = "debug", name = "EntryPoint::handle_ops", skip_all, fields(ops = ops.len()))]
fn handle_ops(
    state: &mut WorldState,
    ctx: &CallContext,
    ops: &[Operation],
    beneficiary: &Address,
) -> Result<Response, ExecutionError> {
    if state.has_code(&ctx.caller) {
        return Err(ExecutionError::authorization(
            "handle_ops",
            ctx.caller,
            "must be called by an external account",
        ));
    }
    if ops.is_empty() {
        return Err(ExecutionError::validation("handle_ops", "empty batch"));
    }
    if *beneficiary == ZERO_ADDRESS {
        return Err(ExecutionError::validation("handle_ops", "beneficiary is the zero address"));
    }

    let mut collected: Amount = 0;
    for op in ops {
        let charged = execute_operation(state, ctx, op)?;
        collected = collected
            .checked_add(charged)
            .ok_or_else(|| ExecutionError::validation("handle_ops", "gas charge overflow"))?;
    }
    state.transfer_native(&ctx.this, beneficiary, collected, "handle_ops")?;
    tracing::debug!("paid {} to beneficiary {}", collected, short_hex(beneficiary));
    Ok(Response::Amount(collected))
}

/// Validate and run one operation, returning the gas charge.
fn execute_operation(state: &mut WorldState, ctx: &CallContext, op: &Operation) -> Result<Amount, ExecutionError> {
    let chain_id = state.contract::<EntryPoint>(&ctx.this)?.chain_id();
    let operation_hash = op.hash(&ctx.this, chain_id);
    let gas_price = op.effective_gas_price(state.env().base_fee);
    // bounds every gas sum below
    if op.total_gas_limit().is_none() {
        return Err(ExecutionError::validation("handle_ops", "gas limits overflow"));
    }

    // deployment
    let mut verification_used = VALIDATION_GAS;
    match (state.has_code(&op.sender), &op.init_code) {
        (true, Some(_)) => return Err(ChainStateError::AlreadyDeployed(op.sender).into()),
        (false, None) => return Err(ChainStateError::NotDeployed(op.sender).into()),
        (false, Some(init)) => {
            let create = Call::Factory(FactoryCall::CreateAccount { owner: init.owner, salt: init.salt });
            let derived = state.call(ctx.this, init.factory, 0, &create)?.into_address()?;
            if derived != op.sender {
                return Err(ChainStateError::AddressMismatch { expected: op.sender, derived }.into());
            }
            verification_used += DEPLOYMENT_GAS;
        }
        (true, None) => {}
    }
    if verification_used > op.verification_gas_limit {
        return Err(ExecutionError::validation(
            "handle_ops",
            format!("verification needs {verification_used} gas, limit is {}", op.verification_gas_limit),
        ));
    }

    // signature and nonce
    state
        .contract::<SmartAccount>(&op.sender)?
        .validate_signature(&op.sender, &operation_hash, &op.signature)?;
    state
        .contract_mut::<EntryPoint>(&ctx.this)?
        .use_nonce(&op.sender, op.nonce_key, op.nonce)?;

    // prefund
    let payer = match &op.paymaster {
        Some(paymaster) => {
            state.contract::<Paymaster>(paymaster)?.validate_sponsorship(&op.sender)?;
            *paymaster
        }
        None => op.sender,
    };
    let prefund = op
        .required_prefund(state.env().base_fee)
        .ok_or_else(|| ExecutionError::validation("handle_ops", "gas limits overflow"))?;
    state.contract_mut::<EntryPoint>(&ctx.this)?.debit_deposit(&payer, prefund)?;

    // execution
    let needed = call_gas(&op.call_data);
    let outcome = if needed > op.call_gas_limit {
        Err(ExecutionError::validation(
            "execute",
            format!("call needs {needed} gas, limit is {}", op.call_gas_limit),
        ))
    } else {
        Call::decode(&op.call_data).and_then(|call| state.call_or_revert(ctx.this, op.sender, 0, &call))
    };
    let call_used = needed.min(op.call_gas_limit);

    // settlement
    let actual_gas = op
        .pre_verification_gas
        .saturating_add(verification_used)
        .saturating_add(call_used);
    let actual_cost = (actual_gas as Amount).saturating_mul(gas_price).min(prefund);
    state
        .contract_mut::<EntryPoint>(&ctx.this)?
        .credit_deposit(&payer, prefund - actual_cost)?;

    match &outcome {
        Ok(_) => tracing::info!("operation {} from {} succeeded", op.nonce, short_hex(&op.sender)),
        Err(e) => tracing::warn!("operation {} from {} reverted: {}", op.nonce, short_hex(&op.sender), e),
    }
    state.emit(
        ctx.this,
        Event::OperationExecuted {
            operation_hash,
            sender: op.sender,
            paymaster: op.paymaster,
            nonce: op.nonce,
            success: outcome.is_ok(),
            actual_gas_cost: actual_cost,
            revert_reason: outcome.err(),
        },
    );
    Ok(actual_cost)
}
