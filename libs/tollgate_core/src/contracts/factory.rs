use serde::{Deserialize, Serialize};
use tollgate_crypto::{
    hashing::{DefaultHash, HashFunction},
    types::{short_hex, StdByteArray},
};

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{FactoryCall, Response},
        errors::ExecutionError,
        events::Event,
        Address,
    },
};

use super::{smart_account::SmartAccount, CallContext};

/// Deploys single-owner smart accounts at deterministic addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFactory {
    entry_point: Address,
}

/// Identifies the code of a smart account bound to `entry_point` and
/// `owner`, the way an init code hash does.
fn account_code_hash(entry_point: &Address, owner: &Address) -> StdByteArray {
    let mut hasher = DefaultHash::with_domain("tollgate.code");
    hasher.update(b"SmartAccount");
    hasher.update(entry_point);
    hasher.update(owner);
    hasher.digest()
}

/// The address a smart account for `owner` gets when `factory` deploys it.
/// Pure, so clients can compute it before deployment.
pub fn counterfactual_address(factory: &Address, entry_point: &Address, owner: &Address, salt: u64) -> Address {
    let mut hasher = DefaultHash::with_domain("tollgate.create2");
    hasher.update([0xffu8]);
    hasher.update(factory);
    hasher.update(salt.to_le_bytes());
    hasher.update(account_code_hash(entry_point, owner));
    hasher.digest()
}

impl AccountFactory {
    pub fn new(entry_point: Address) -> Self {
        AccountFactory { entry_point }
    }

    pub fn entry_point(&self) -> &Address {
        &self.entry_point
    }
}

pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &FactoryCall) -> Result<Response, ExecutionError> {
    let entry_point = *state.contract::<AccountFactory>(&ctx.this)?.entry_point();
    match call {
        FactoryCall::CreateAccount { owner, salt } => {
            let address = counterfactual_address(&ctx.this, &entry_point, owner, *salt);
            // idempotent: an existing account is returned as is
            if !state.has_code(&address) {
                state.install(address, SmartAccount::new(*owner, entry_point))?;
                tracing::info!("deployed smart account {} for {}", short_hex(&address), short_hex(owner));
                state.emit(ctx.this, Event::AccountDeployed { account: address, owner: *owner, factory: ctx.this });
            }
            Ok(Response::Address(address))
        }
        FactoryCall::GetAddress { owner, salt } => {
            Ok(Response::Address(counterfactual_address(&ctx.this, &entry_point, owner, *salt)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{contracts::fixtures::Fixture, primitives::calls::Call};

    #[test]
    fn test_address_depends_on_every_input() {
        let base = counterfactual_address(&[1u8; 32], &[2u8; 32], &[3u8; 32], 0);
        assert_eq!(base, counterfactual_address(&[1u8; 32], &[2u8; 32], &[3u8; 32], 0));
        assert_ne!(base, counterfactual_address(&[9u8; 32], &[2u8; 32], &[3u8; 32], 0));
        assert_ne!(base, counterfactual_address(&[1u8; 32], &[9u8; 32], &[3u8; 32], 0));
        assert_ne!(base, counterfactual_address(&[1u8; 32], &[2u8; 32], &[9u8; 32], 0));
        assert_ne!(base, counterfactual_address(&[1u8; 32], &[2u8; 32], &[3u8; 32], 1));
    }

    #[test]
    fn test_create_account_is_idempotent() {
        let mut fixture = Fixture::new();
        let owner = [7u8; 32];
        let predicted = fixture
            .view(fixture.factory, Call::Factory(FactoryCall::GetAddress { owner, salt: 0 }))
            .into_address()
            .unwrap();
        assert!(!fixture.state.has_code(&predicted));

        let created = fixture
            .call([1u8; 32], fixture.factory, Call::Factory(FactoryCall::CreateAccount { owner, salt: 0 }))
            .unwrap();
        assert_eq!(created, Response::Address(predicted));
        assert_eq!(fixture.events.len(), 1);
        let account = fixture.state.contract::<SmartAccount>(&predicted).unwrap();
        assert_eq!(account.owner(), &owner);

        let again = fixture
            .call([1u8; 32], fixture.factory, Call::Factory(FactoryCall::CreateAccount { owner, salt: 0 }))
            .unwrap();
        assert_eq!(again, Response::Address(predicted));
        assert!(fixture.events.is_empty());
    }
}
