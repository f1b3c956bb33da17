//! Domain-hashed storage keys.
//!
//! Every key is a BLAKE3 digest over the owning component's address and a
//! logical path, so two components hashing the same path never collide.

use std::fmt;

use poa_shared_types::Address;

const DOMAIN_TAG: &[u8] = b"poa.eternal-storage.v1";
const SCALAR_TAG: u8 = 0x00;
const MAPPING_TAG: u8 = 0x01;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(pub [u8; 32]);

impl StorageKey {
    /// Key of a scalar or array value stored at `path`.
    pub fn scalar(namespace: &Address, path: &str) -> Self {
        let mut hasher = Self::hasher(namespace, path);
        hasher.update(&[SCALAR_TAG]);
        StorageKey(*hasher.finalize().as_bytes())
    }

    /// Key of the entry for `key` in the mapping stored at `path`.
    pub fn mapping(namespace: &Address, path: &str, key: &Address) -> Self {
        let mut hasher = Self::hasher(namespace, path);
        hasher.update(&[MAPPING_TAG]);
        hasher.update(key.as_bytes());
        StorageKey(*hasher.finalize().as_bytes())
    }

    fn hasher(namespace: &Address, path: &str) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_TAG);
        hasher.update(namespace.as_bytes());
        hasher.update(&(path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for StorageKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
