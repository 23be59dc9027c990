//! Wallet wrapper around an ed25519 keypair with a local nonce.
use tollgate_crypto::{
    signing::{DefaultSigner, SigFunction},
    types::{SignatureBytes, StdByteArray},
};

use crate::primitives::Address;

/// A local wallet that can sign data and exposes its public address.
#[derive(Clone)]
pub struct Wallet {
    pub address: Address,
    signing_key: DefaultSigner,
    // the local copy of the next transaction nonce to send
    nonce: u64,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &tollgate_crypto::types::short_hex(&self.address))
            .field("nonce", &self.nonce)
            .finish()
    }
}

impl Wallet {
    /// Restore a wallet from its private key.
    pub fn new(private_key: StdByteArray) -> Self {
        let signing_key = DefaultSigner::new(private_key);
        Wallet {
            address: signing_key.public_key(),
            signing_key,
            nonce: 0,
        }
    }

    /// Generate a new random wallet using a freshly generated ed25519 keypair.
    pub fn generate_random() -> Self {
        let signing_key = DefaultSigner::generate_random();
        Wallet {
            address: signing_key.public_key(),
            signing_key,
            nonce: 0,
        }
    }

    /// Return the private key bytes (32) of this wallet.
    pub fn private_key(&self) -> StdByteArray {
        self.signing_key.to_bytes()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn nonce_mut(&mut self) -> &mut u64 {
        &mut self.nonce
    }

    /// Take the next nonce and advance the local counter.
    pub fn next_nonce(&mut self) -> u64 {
        let nonce = self.nonce;
        self.nonce += 1;
        nonce
    }
}

impl SigFunction for Wallet {
    fn sign_bytes(&mut self, data: &[u8]) -> SignatureBytes {
        self.signing_key.sign_bytes(data)
    }

    fn public_key(&self) -> StdByteArray {
        self.address
    }

    fn to_bytes(&self) -> StdByteArray {
        self.signing_key.to_bytes()
    }
}
