//! Hashing traits and a default SHA3-256 implementation.
//!
//! The `Hashable` trait abstracts how a type contributes bytes to a hash
//! function. The `HashFunction` trait exposes a minimal update/finalize API
//! so hashers are easy to swap in tests.
//!
//! Every field is length-prefixed before it is absorbed, so `("ab", "c")`
//! and `("a", "bc")` never collide. A hasher may carry a domain tag that is
//! absorbed first; different object kinds use different tags.

use sha3::{Digest, Sha3_256};

use crate::types::StdByteArray;

/// A trait for objects that can be hashed using a hash function.
///
/// Implementors should call `hasher.update(...)` for each field to include
/// and then return `hasher.digest()`.
pub trait Hashable {
    fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray;
}

/// A trait for hash functions that support updating with data and producing a digest.
pub trait HashFunction {
    /// Absorb one field.
    fn update(&mut self, data: impl AsRef<[u8]>);

    /// Finalize, returning the digest and resetting the hasher to its
    /// initial (tagged) state.
    fn digest(&mut self) -> StdByteArray;
}

/// SHA3-256 with optional domain separation.
#[derive(Clone)]
pub struct DefaultHash {
    hasher: Sha3_256,
    domain: Option<&'static str>,
}

impl Default for DefaultHash {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultHash {
    /// An untagged SHA3-256 hasher.
    pub fn new() -> Self {
        DefaultHash {
            hasher: Sha3_256::new(),
            domain: None,
        }
    }

    /// A hasher whose every digest is bound to `domain`.
    pub fn with_domain(domain: &'static str) -> Self {
        let mut hash = DefaultHash {
            hasher: Sha3_256::new(),
            domain: Some(domain),
        };
        hash.absorb_domain();
        hash
    }

    fn absorb_domain(&mut self) {
        if let Some(domain) = self.domain {
            self.update(domain.as_bytes());
        }
    }
}

impl HashFunction for DefaultHash {
    fn update(&mut self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        self.hasher.update((data.len() as u64).to_le_bytes());
        self.hasher.update(data);
    }

    fn digest(&mut self) -> StdByteArray {
        let result: StdByteArray = self.hasher.finalize_reset().into();
        self.absorb_domain();
        result
    }
}

/// Hash a list of fields in one call.
pub fn hash_fields(hasher: &mut impl HashFunction, fields: &[&[u8]]) -> StdByteArray {
    for field in fields {
        hasher.update(field);
    }
    hasher.digest()
}

mod implementations {
    use super::{HashFunction, Hashable};
    use crate::types::StdByteArray;

    impl Hashable for &str {
        fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
            hasher.update(self.as_bytes());
            hasher.digest()
        }
    }

    impl Hashable for String {
        fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
            hasher.update(self.as_bytes());
            hasher.digest()
        }
    }

    impl Hashable for StdByteArray {
        fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
            hasher.update(self);
            hasher.digest()
        }
    }

    impl Hashable for Vec<u8> {
        fn hash(&self, hasher: &mut impl HashFunction) -> StdByteArray {
            hasher.update(self.as_slice());
            hasher.digest()
        }
    }
}
