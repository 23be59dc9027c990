use serde::{Deserialize, Serialize};

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{PaymasterCall, Response},
        errors::ExecutionError,
        events::Event,
        Address,
    },
};

use super::CallContext;

/// Sponsors operations from its deposit in the entry point until its owner
/// pauses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paymaster {
    owner: Address,
    entry_point: Address,
    paused: bool,
}

impl Paymaster {
    pub fn new(owner: Address, entry_point: Address) -> Self {
        Paymaster { owner, entry_point, paused: false }
    }

    pub fn entry_point(&self) -> &Address {
        &self.entry_point
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Agree to pay for an operation from `sender`.
    pub fn validate_sponsorship(&self, sender: &Address) -> Result<(), ExecutionError> {
        if self.paused {
            return Err(ExecutionError::authorization("validate_paymaster", *sender, "sponsorship is paused"));
        }
        Ok(())
    }
}

pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &PaymasterCall) -> Result<Response, ExecutionError> {
    let paymaster = state.contract_mut::<Paymaster>(&ctx.this)?;
    match call {
        PaymasterCall::SetPaused { paused } => {
            if ctx.caller != paymaster.owner {
                return Err(ExecutionError::authorization("set_paused", ctx.caller, "caller is not the paymaster owner"));
            }
            paymaster.paused = *paused;
            tracing::info!("paymaster paused: {}", paused);
            state.emit(ctx.this, Event::PaymasterPaused { paused: *paused });
            Ok(Response::Empty)
        }
        PaymasterCall::IsPaused => Ok(Response::Bool(paymaster.paused)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{contracts::fixtures::Fixture, primitives::calls::Call};

    #[test]
    fn test_only_owner_pauses() {
        let mut fixture = Fixture::new();
        let target = fixture.paymaster;
        let err = fixture
            .call([1u8; 32], target, Call::Paymaster(PaymasterCall::SetPaused { paused: true }))
            .unwrap_err();
        assert!(err.is_authorization());

        let owner = fixture.deployer;
        fixture.call(owner, target, Call::Paymaster(PaymasterCall::SetPaused { paused: true })).unwrap();
        assert_eq!(fixture.view(target, Call::Paymaster(PaymasterCall::IsPaused)), Response::Bool(true));
        let paymaster = fixture.state.contract::<Paymaster>(&target).unwrap();
        assert!(paymaster.validate_sponsorship(&[1u8; 32]).unwrap_err().is_authorization());
    }
}
