use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use tollgate_crypto::{
    hashing::{DefaultHash, HashFunction, Hashable},
    signing::{DefaultVerifier, SigFunction, SigVerFunction, Signable},
    types::{SignatureBytes, StdByteArray},
};

use crate::protocol::serialization::TollSerialize;

use super::{calls::Call, errors::ExecutionError, Address, Amount};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    // header is the signed content of the transaction
    pub header: TransactionHeader,
    // hash is the sha3_256 hash of the transaction header
    pub hash: StdByteArray,
    // signature is the signature over the hash
    #[serde_as(as = "Bytes")]
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    // sender is the ed25519 public key of the sender
    pub sender: Address,
    // receiver is the contract (or account) being called
    pub receiver: Address,
    // native value moved with the call
    pub value: Amount,
    // an encoded call, empty for a plain value transfer
    pub data: Vec<u8>,
    // must equal the sender's transaction count
    pub nonce: u64,
    // the time the transaction was created by the client
    pub timestamp: u64,
    pub chain_id: u64,
}

impl TransactionHeader {
    pub fn new(
        sender: Address,
        receiver: Address,
        value: Amount,
        data: Vec<u8>,
        nonce: u64,
        timestamp: u64,
        chain_id: u64,
    ) -> Self {
        TransactionHeader { sender, receiver, value, data, nonce, timestamp, chain_id }
    }

    /// Hash the transaction header using the provided HashFunction
    pub fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
        hasher.update(self.sender);
        hasher.update(self.receiver);
        hasher.update(self.value.to_le_bytes());
        hasher.update(&self.data);
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.chain_id.to_le_bytes());
        hasher.digest()
    }
}

impl Transaction {
    pub fn new(header: TransactionHeader) -> Self {
        let hash = header.hash(&mut transaction_hasher());
        Transaction { header, hash, signature: [0; 64] }
    }

    /// An unsigned transaction carrying `call`.
    pub fn call(
        sender: Address,
        receiver: Address,
        value: Amount,
        call: &Call,
        nonce: u64,
        timestamp: u64,
        chain_id: u64,
    ) -> Result<Self, ExecutionError> {
        let data = call.encode()?;
        Ok(Self::new(TransactionHeader::new(sender, receiver, value, data, nonce, timestamp, chain_id)))
    }

    pub fn sign(&mut self, signer: &mut impl SigFunction) -> SignatureBytes {
        self.signature = signer.sign_bytes(&self.hash);
        self.signature
    }

    pub fn hash_is_valid(&self) -> bool {
        self.header.hash(&mut transaction_hasher()) == self.hash
    }

    /// `true` if the sender's key signed this hash.
    pub fn verify_signature(&self) -> bool {
        DefaultVerifier::from_bytes(&self.header.sender)
            .map(|verifier| verifier.verify(&self.signature, self))
            .unwrap_or(false)
    }

    pub fn decode_call(&self) -> Result<Call, ExecutionError> {
        Call::decode(&self.header.data)
    }
}

fn transaction_hasher() -> DefaultHash {
    DefaultHash::with_domain("tollgate.transaction")
}

impl Hashable for Transaction {
    fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
        self.header.hash(hasher)
    }
}

impl Signable for Transaction {
    fn signing_bytes(&self) -> StdByteArray {
        self.hash
    }
}

impl TollSerialize for Transaction {}
