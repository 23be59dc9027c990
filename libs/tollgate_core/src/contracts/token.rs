//! Fungible payment token with allowances and a faucet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{Response, TokenCall},
        errors::ExecutionError,
        events::Event,
        Address, Amount, ZERO_ADDRESS,
    },
};

use super::CallContext;

/// An allowance of this size is never decremented.
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    symbol: String,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    // (owner, spender) -> remaining allowance
    allowances: BTreeMap<(Address, Address), Amount>,
}

impl Token {
    pub fn new(symbol: &str) -> Self {
        Token { symbol: symbol.to_string(), ..Default::default() }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn move_balance(&mut self, method: &str, from: &Address, to: &Address, amount: Amount) -> Result<(), ExecutionError> {
        if *to == ZERO_ADDRESS {
            return Err(ExecutionError::validation(method, "transfer to the zero address"));
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(ExecutionError::insufficient_funds(method, amount, available));
        }
        self.balances.insert(*from, available - amount);
        let received = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| ExecutionError::validation(method, "balance overflow"))?;
        self.balances.insert(*to, received);
        Ok(())
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), ExecutionError> {
        self.move_balance("transfer", from, to, amount)
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) -> Result<(), ExecutionError> {
        if *spender == ZERO_ADDRESS {
            return Err(ExecutionError::validation("approve", "approval for the zero address"));
        }
        self.allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    /// Spend `amount` of `from`'s balance on behalf of `spender`.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(ExecutionError::insufficient_funds("transfer_from", amount, allowance));
        }
        self.move_balance("transfer_from", from, to, amount)?;
        if allowance != UNLIMITED_ALLOWANCE {
            self.allowances.insert((*from, *spender), allowance - amount);
        }
        Ok(())
    }

    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<(), ExecutionError> {
        let overflow = || ExecutionError::validation("mint", "supply overflow");
        self.total_supply = self.total_supply.checked_add(amount).ok_or_else(overflow)?;
        let balance = self.balance_of(to).checked_add(amount).ok_or_else(overflow)?;
        self.balances.insert(*to, balance);
        Ok(())
    }
}

pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &TokenCall) -> Result<Response, ExecutionError> {
    let token = state.contract_mut::<Token>(&ctx.this)?;
    match call {
        TokenCall::Transfer { to, amount } => {
            token.transfer(&ctx.caller, to, *amount)?;
            state.emit(ctx.this, Event::Transfer { from: ctx.caller, to: *to, amount: *amount });
            Ok(Response::Empty)
        }
        TokenCall::Approve { spender, amount } => {
            token.approve(&ctx.caller, spender, *amount)?;
            state.emit(ctx.this, Event::Approval { owner: ctx.caller, spender: *spender, amount: *amount });
            Ok(Response::Empty)
        }
        TokenCall::TransferFrom { from, to, amount } => {
            token.transfer_from(&ctx.caller, from, to, *amount)?;
            state.emit(ctx.this, Event::Transfer { from: *from, to: *to, amount: *amount });
            Ok(Response::Empty)
        }
        TokenCall::Mint { amount } => {
            token.mint(&ctx.caller, *amount)?;
            state.emit(ctx.this, Event::Transfer { from: ZERO_ADDRESS, to: ctx.caller, amount: *amount });
            Ok(Response::Empty)
        }
        TokenCall::BalanceOf { owner } => Ok(Response::Amount(token.balance_of(owner))),
        TokenCall::Allowance { owner, spender } => Ok(Response::Amount(token.allowance(owner, spender))),
        TokenCall::Symbol => Ok(Response::Text(token.symbol().to_string())),
    }
}
