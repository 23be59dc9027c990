//! ed25519 signing and verification behind small traits.
//!
//! Objects are never signed directly: an object exposes the canonical bytes
//! it is authorised by (usually its hash) through [`Signable`], and a
//! [`SigFunction`] signs those bytes.

use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;

use crate::types::{SignatureBytes, StdByteArray};

/// An object that can be authorised by a signature.
pub trait Signable {
    /// The canonical bytes covered by the signature.
    fn signing_bytes(&self) -> StdByteArray;
}

/// A private signing capability.
pub trait SigFunction {
    /// Sign raw bytes.
    fn sign_bytes(&mut self, data: &[u8]) -> SignatureBytes;

    /// Sign the canonical bytes of `data`.
    fn sign(&mut self, data: &impl Signable) -> SignatureBytes {
        self.sign_bytes(&data.signing_bytes())
    }

    /// The public key matching this signer.
    fn public_key(&self) -> StdByteArray;

    /// The private key bytes.
    fn to_bytes(&self) -> StdByteArray;
}

/// A public verification capability.
pub trait SigVerFunction: Sized {
    /// `true` if `signature` was produced over `data` by the matching key.
    fn verify_bytes(&self, signature: &SignatureBytes, data: &[u8]) -> bool;

    fn verify(&self, signature: &SignatureBytes, target: &impl Signable) -> bool {
        self.verify_bytes(signature, &target.signing_bytes())
    }

    fn to_bytes(&self) -> StdByteArray;

    /// Fails when the bytes are not a valid curve point.
    fn from_bytes(bytes: &StdByteArray) -> Result<Self, SignatureError>;
}

/// Default signer is the ed25519 signing function
#[derive(Clone)]
pub struct DefaultSigner {
    private_key: SigningKey,
}

/// Default verifier is the ed25519 verifying function
#[derive(Clone, Debug)]
pub struct DefaultVerifier {
    public_key: VerifyingKey,
}

impl DefaultSigner {
    pub fn new(private_key: StdByteArray) -> Self {
        DefaultSigner {
            private_key: SigningKey::from_bytes(&private_key),
        }
    }

    pub fn generate_random() -> Self {
        DefaultSigner {
            private_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifier(&self) -> DefaultVerifier {
        DefaultVerifier {
            public_key: self.private_key.verifying_key(),
        }
    }
}

impl SigFunction for DefaultSigner {
    fn sign_bytes(&mut self, data: &[u8]) -> SignatureBytes {
        self.private_key.sign(data).to_bytes()
    }

    fn public_key(&self) -> StdByteArray {
        self.private_key.verifying_key().to_bytes()
    }

    fn to_bytes(&self) -> StdByteArray {
        self.private_key.to_bytes()
    }
}

impl SigVerFunction for DefaultVerifier {
    fn verify_bytes(&self, signature: &SignatureBytes, data: &[u8]) -> bool {
        let signature = Signature::from_bytes(signature);
        self.public_key.verify_strict(data, &signature).is_ok()
    }

    fn to_bytes(&self) -> StdByteArray {
        self.public_key.to_bytes()
    }

    fn from_bytes(bytes: &StdByteArray) -> Result<Self, SignatureError> {
        Ok(DefaultVerifier {
            public_key: VerifyingKey::from_bytes(bytes)?,
        })
    }
}
