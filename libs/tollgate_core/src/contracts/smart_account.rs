use serde::{Deserialize, Serialize};
use tollgate_crypto::{
    signing::{DefaultVerifier, SigVerFunction},
    types::{SignatureBytes, StdByteArray},
};

use crate::{
    accounting::state::WorldState,
    primitives::{
        calls::{AccountCall, Call, Response},
        errors::ExecutionError,
        Address,
    },
};

use super::CallContext;

/// A single-owner wallet contract. It forwards calls for its owner, either
/// directly or through the entry point after an operation was validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartAccount {
    owner: Address,
    entry_point: Address,
}

impl SmartAccount {
    pub fn new(owner: Address, entry_point: Address) -> Self {
        SmartAccount { owner, entry_point }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn entry_point(&self) -> &Address {
        &self.entry_point
    }

    /// Check that the owner key signed `operation_hash`.
    pub fn validate_signature(
        &self,
        account: &Address,
        operation_hash: &StdByteArray,
        signature: &SignatureBytes,
    ) -> Result<(), ExecutionError> {
        let verifier = DefaultVerifier::from_bytes(&self.owner).map_err(|e| {
            ExecutionError::authorization("validate_signature", *account, format!("owner key is invalid: {e}"))
        })?;
        if !verifier.verify_bytes(signature, operation_hash) {
            return Err(ExecutionError::authorization(
                "validate_signature",
                *account,
                "signature does not match the account owner",
            ));
        }
        Ok(())
    }
}

pub(crate) fn dispatch(state: &mut WorldState, ctx: &CallContext, call: &AccountCall) -> Result<Response, ExecutionError> {
    let account = state.contract::<SmartAccount>(&ctx.this)?;
    match call {
        AccountCall::Execute { target, value, data } => {
            if ctx.caller != account.entry_point && ctx.caller != account.owner {
                return Err(ExecutionError::authorization(
                    "execute",
                    ctx.caller,
                    "only the entry point or the owner may execute",
                ));
            }
            let inner = Call::decode(data)?;
            state.call(ctx.this, *target, *value, &inner)
        }
        AccountCall::Owner => Ok(Response::Address(account.owner)),
    }
}
