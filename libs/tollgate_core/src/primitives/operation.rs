use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use tollgate_crypto::{
    hashing::{DefaultHash, HashFunction},
    signing::SigFunction,
    types::{SignatureBytes, StdByteArray},
};

use super::{Address, Amount};

/// Deploys the sender through `factory` on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCode {
    pub factory: Address,
    pub owner: Address,
    pub salt: u64,
}

/// A request to act through a smart account, relayed by a bundler and
/// validated by the entry point. Operations are never persisted on their
/// own; they only live inside a `handle_ops` transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub sender: Address,
    pub nonce_key: u64,
    pub nonce: u64,
    pub init_code: Option<InitCode>,
    /// An encoded account call, normally `AccountCall::Execute`.
    pub call_data: Vec<u8>,
    pub call_gas_limit: u64,
    pub verification_gas_limit: u64,
    pub pre_verification_gas: u64,
    pub max_fee_per_gas: Amount,
    pub max_priority_fee_per_gas: Amount,
    pub paymaster: Option<Address>,
    #[serde_as(as = "Bytes")]
    pub signature: SignatureBytes,
}

impl Operation {
    /// Hash of every field except the signature, bound to the entry point
    /// and chain so an operation cannot be replayed elsewhere.
    pub fn hash(&self, entry_point: &Address, chain_id: u64) -> StdByteArray {
        let mut hasher = DefaultHash::with_domain("tollgate.operation");
        hasher.update(entry_point);
        hasher.update(chain_id.to_le_bytes());
        hasher.update(self.sender);
        hasher.update(self.nonce_key.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        match &self.init_code {
            Some(init) => {
                hasher.update([1u8]);
                hasher.update(init.factory);
                hasher.update(init.owner);
                hasher.update(init.salt.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(&self.call_data);
        hasher.update(self.call_gas_limit.to_le_bytes());
        hasher.update(self.verification_gas_limit.to_le_bytes());
        hasher.update(self.pre_verification_gas.to_le_bytes());
        hasher.update(self.max_fee_per_gas.to_le_bytes());
        hasher.update(self.max_priority_fee_per_gas.to_le_bytes());
        match &self.paymaster {
            Some(paymaster) => {
                hasher.update([1u8]);
                hasher.update(paymaster);
            }
            None => hasher.update([0u8]),
        }
        hasher.digest()
    }

    pub fn sign(&mut self, entry_point: &Address, chain_id: u64, signer: &mut impl SigFunction) -> SignatureBytes {
        let hash = self.hash(entry_point, chain_id);
        self.signature = signer.sign_bytes(&hash);
        self.signature
    }

    /// The sum of the three gas limits, or `None` if it overflows.
    pub fn total_gas_limit(&self) -> Option<u64> {
        self.call_gas_limit
            .checked_add(self.verification_gas_limit)?
            .checked_add(self.pre_verification_gas)
    }

    /// `min(max_fee, base_fee + max_priority_fee)`
    pub fn effective_gas_price(&self, base_fee: Amount) -> Amount {
        self.max_fee_per_gas
            .min(base_fee.saturating_add(self.max_priority_fee_per_gas))
    }

    /// The most this operation can cost; reserved up front.
    pub fn required_prefund(&self, base_fee: Amount) -> Option<Amount> {
        (self.total_gas_limit()? as Amount).checked_mul(self.effective_gas_price(base_fee))
    }
}
