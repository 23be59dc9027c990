//! The unit registry: ownership, pricing, per-user access and proceeds.
//!
//! A unit is created without a price and cannot be unlocked until its
//! owner sets one. Unlocking pulls the price from the caller through the
//! payment token's `transfer_from`, with the ledger as spender, and
//! records the block time of the payment. The owner withdraws the
//! accumulated balance; revenue only ever grows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tollgate_crypto::types::short_hex;

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{Call, LedgerCall, Response, TokenCall},
        errors::ExecutionError,
        events::Event,
        Address, Amount, UnitId, ZERO_ADDRESS,
    },
};

use super::CallContext;

/// Pricing and proceeds of one unit. `cost == 0` means the owner has not
/// set a price yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitParams {
    pub cost: Amount,
    pub token: Address,
    /// Withdrawable proceeds.
    pub balance: Amount,
    /// Everything ever paid for this unit.
    pub revenue: Amount,
    pub created: u64,
}

impl UnitParams {
    pub fn is_ready(&self) -> bool {
        self.cost > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub owner: Address,
    pub metadata_uri: String,
    pub params: UnitParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLedger {
    units: BTreeMap<UnitId, Unit>,
    // (unit, user) -> block time of the last payment
    access: BTreeMap<(UnitId, Address), u64>,
    next_unit_id: UnitId,
}

impl AccessLedger {
    pub fn next_unit_id(&self) -> UnitId {
        self.next_unit_id
    }

    pub fn unit(&self, method: &str, unit_id: UnitId) -> Result<&Unit, ExecutionError> {
        self.units
            .get(&unit_id)
            .ok_or_else(|| ExecutionError::validation(method, "unknown unit").for_unit(unit_id))
    }

    /// The unit, if `caller` owns it.
    fn owned_unit_mut(&mut self, method: &str, unit_id: UnitId, caller: &Address) -> Result<&mut Unit, ExecutionError> {
        let unit = self
            .units
            .get_mut(&unit_id)
            .ok_or_else(|| ExecutionError::validation(method, "unknown unit").for_unit(unit_id))?;
        if unit.owner != *caller {
            return Err(ExecutionError::authorization(method, *caller, "caller does not own the unit").for_unit(unit_id));
        }
        Ok(unit)
    }

    pub fn create(&mut self, owner: Address, metadata_uri: String, timestamp: u64) -> UnitId {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        self.units.insert(
            id,
            Unit {
                id,
                owner,
                metadata_uri,
                params: UnitParams { created: timestamp, ..Default::default() },
            },
        );
        id
    }

    pub fn set_params(&mut self, caller: &Address, unit_id: UnitId, cost: Amount, token: Address) -> Result<(), ExecutionError> {
        let unit = self.owned_unit_mut("set_params", unit_id, caller)?;
        if cost == 0 {
            return Err(ExecutionError::validation("set_params", "cost must be positive").for_unit(unit_id));
        }
        if token == ZERO_ADDRESS {
            return Err(ExecutionError::validation("set_params", "token is the zero address").for_unit(unit_id));
        }
        unit.params.cost = cost;
        unit.params.token = token;
        Ok(())
    }

    /// Price and payment token of a unit that is ready to be unlocked.
    pub fn price(&self, unit_id: UnitId) -> Result<(Amount, Address), ExecutionError> {
        let params = self.unit("unlock", unit_id)?.params;
        if !params.is_ready() {
            return Err(ExecutionError::validation("unlock", "unit parameters are not set").for_unit(unit_id));
        }
        Ok((params.cost, params.token))
    }

    /// Book a payment that has already been collected.
    pub fn record_payment(&mut self, unit_id: UnitId, user: Address, amount: Amount, timestamp: u64) -> Result<(), ExecutionError> {
        let unit = self
            .units
            .get_mut(&unit_id)
            .ok_or_else(|| ExecutionError::validation("unlock", "unknown unit").for_unit(unit_id))?;
        let overflow = || ExecutionError::validation("unlock", "revenue overflow").for_unit(unit_id);
        unit.params.balance = unit.params.balance.checked_add(amount).ok_or_else(overflow)?;
        unit.params.revenue = unit.params.revenue.checked_add(amount).ok_or_else(overflow)?;
        self.access.insert((unit_id, user), timestamp);
        Ok(())
    }

    /// Zero the balance of an owned unit, returning what was there and the
    /// token it is denominated in.
    pub fn take_balance(&mut self, caller: &Address, unit_id: UnitId, to: &Address) -> Result<(Amount, Address), ExecutionError> {
        let unit = self.owned_unit_mut("withdraw", unit_id, caller)?;
        if *to == ZERO_ADDRESS {
            return Err(ExecutionError::validation("withdraw", "recipient is the zero address").for_unit(unit_id));
        }
        let amount = std::mem::take(&mut unit.params.balance);
        Ok((amount, unit.params.token))
    }

    pub fn transfer_unit(&mut self, caller: &Address, unit_id: UnitId, to: Address) -> Result<(), ExecutionError> {
        let unit = self.owned_unit_mut("transfer_unit", unit_id, caller)?;
        if to == ZERO_ADDRESS {
            return Err(ExecutionError::validation("transfer_unit", "transfer to the zero address").for_unit(unit_id));
        }
        unit.owner = to;
        Ok(())
    }

    /// 0 if the user never paid.
    pub fn payment_date(&self, unit_id: UnitId, user: &Address) -> u64 {
        self.access.get(&(unit_id, *user)).copied().unwrap_or(0)
    }

    pub fn is_user(&self, unit_id: UnitId, user: &Address) -> bool {
        self.payment_date(unit_id, user) > 0
    }

    pub fn units_of(&self, owner: &Address) -> Vec<UnitId> {
        self.units
            .values()
            .filter(|unit| unit.owner == *owner)
            .map(|unit| unit.id)
            .collect()
    }
}

#[tracing::instrument(level = "debug", name = "AccessLedger::dispatch", skip_all)]
pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &LedgerCall) -> Result<Response, ExecutionError> {
    match call {
        LedgerCall::Create { metadata_uri } => {
            let ledger = state.contract_mut::<AccessLedger>(&ctx.this)?;
            let unit_id = ledger.create(ctx.caller, metadata_uri.clone(), ctx.timestamp);
            tracing::info!("unit {} created by {}", unit_id, short_hex(&ctx.caller));
            state.emit(
                ctx.this,
                Event::UnitCreated { unit_id, owner: ctx.caller, metadata_uri: metadata_uri.clone() },
            );
            Ok(Response::UnitId(unit_id))
        }
        LedgerCall::SetParams { unit_id, cost, token } => {
            state
                .contract_mut::<AccessLedger>(&ctx.this)?
                .set_params(&ctx.caller, *unit_id, *cost, *token)?;
            state.emit(ctx.this, Event::ParamsSet { unit_id: *unit_id, cost: *cost, token: *token });
            Ok(Response::Empty)
        }
        LedgerCall::Unlock { unit_id } => {
            let (cost, token) = state.contract::<AccessLedger>(&ctx.this)?.price(*unit_id)?;
            let pull = Call::Token(TokenCall::TransferFrom { from: ctx.caller, to: ctx.this, amount: cost });
            state
                .call(ctx.this, token, 0, &pull)
                .map_err(|e| e.within("unlock").for_unit(*unit_id))?;
            state
                .contract_mut::<AccessLedger>(&ctx.this)?
                .record_payment(*unit_id, ctx.caller, cost, ctx.timestamp)?;
            tracing::info!("unit {} unlocked for {}", unit_id, short_hex(&ctx.caller));
            state.emit(
                ctx.this,
                Event::Unlocked { unit_id: *unit_id, user: ctx.caller, cost, timestamp: ctx.timestamp },
            );
            Ok(Response::Empty)
        }
        LedgerCall::Withdraw { unit_id, to } => {
            let (amount, token) = state
                .contract_mut::<AccessLedger>(&ctx.this)?
                .take_balance(&ctx.caller, *unit_id, to)?;
            if amount > 0 {
                let payout = Call::Token(TokenCall::Transfer { to: *to, amount });
                state
                    .call(ctx.this, token, 0, &payout)
                    .map_err(|e| e.within("withdraw").for_unit(*unit_id))?;
            }
            state.emit(ctx.this, Event::Withdrawn { unit_id: *unit_id, to: *to, amount });
            Ok(Response::Amount(amount))
        }
        LedgerCall::TransferUnit { unit_id, to } => {
            state
                .contract_mut::<AccessLedger>(&ctx.this)?
                .transfer_unit(&ctx.caller, *unit_id, *to)?;
            state.emit(ctx.this, Event::UnitTransferred { unit_id: *unit_id, from: ctx.caller, to: *to });
            Ok(Response::Empty)
        }
        LedgerCall::IsUser { unit_id, user } => {
            Ok(Response::Bool(state.contract::<AccessLedger>(&ctx.this)?.is_user(*unit_id, user)))
        }
        LedgerCall::GetParams { unit_id } => {
            let unit = state.contract::<AccessLedger>(&ctx.this)?.unit("get_params", *unit_id)?;
            Ok(Response::Params(unit.params))
        }
        LedgerCall::GetPaymentDate { unit_id, user } => {
            Ok(Response::Timestamp(state.contract::<AccessLedger>(&ctx.this)?.payment_date(*unit_id, user)))
        }
        LedgerCall::OwnerOf { unit_id } => {
            let unit = state.contract::<AccessLedger>(&ctx.this)?.unit("owner_of", *unit_id)?;
            Ok(Response::Address(unit.owner))
        }
        LedgerCall::MetadataUri { unit_id } => {
            let unit = state.contract::<AccessLedger>(&ctx.this)?.unit("metadata_uri", *unit_id)?;
            Ok(Response::Text(unit.metadata_uri.clone()))
        }
        LedgerCall::NextUnitId => Ok(Response::UnitId(state.contract::<AccessLedger>(&ctx.this)?.next_unit_id())),
        LedgerCall::UnitsOf { owner } => Ok(Response::Units(state.contract::<AccessLedger>(&ctx.this)?.units_of(owner))),
    }
}
