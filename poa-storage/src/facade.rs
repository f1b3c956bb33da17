//! Typed accessors over a [`KeyValueStore`], namespaced per component.
//!
//! Missing entries read as the zero value of the requested type (zero
//! address, `false`, `0`, empty array). Reading an entry written with a
//! different type is an error rather than a silent default.

use std::fmt;
use std::sync::Arc;

use log::trace;
use poa_shared_types::Address;

use crate::backend::KeyValueStore;
use crate::error::{Result, StorageError};
use crate::key::StorageKey;
use crate::value::StoredValue;

/// Handle to the slice of eternal storage owned by one component.
///
/// Cloning is cheap; all clones share the same underlying store.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn KeyValueStore>,
    namespace: Address,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").field("namespace", &self.namespace).finish()
    }
}

fn mismatch(path: &str, expected: &'static str, found: &StoredValue) -> StorageError {
    StorageError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: found.type_name(),
    }
}

impl Storage {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: Address) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> Address {
        self.namespace
    }

    /// Returns a handle over the same store under another namespace.
    pub fn with_namespace(&self, namespace: Address) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace,
        }
    }

    /// Hashes a logical path into this component's key space.
    pub fn hash_key(&self, path: &str) -> StorageKey {
        StorageKey::scalar(&self.namespace, path)
    }

    fn mapping_key(&self, path: &str, key: &Address) -> StorageKey {
        StorageKey::mapping(&self.namespace, path, key)
    }

    // Typed readers shared by the scalar and mapping accessors.

    fn address_at(&self, key: &StorageKey, path: &str) -> Result<Address> {
        match self.store.get(key)? {
            None => Ok(Address::ZERO),
            Some(StoredValue::Address(value)) => Ok(value),
            Some(other) => Err(mismatch(path, "address", &other)),
        }
    }

    fn bool_at(&self, key: &StorageKey, path: &str) -> Result<bool> {
        match self.store.get(key)? {
            None => Ok(false),
            Some(StoredValue::Bool(value)) => Ok(value),
            Some(other) => Err(mismatch(path, "bool", &other)),
        }
    }

    fn uint_at(&self, key: &StorageKey, path: &str) -> Result<u64> {
        match self.store.get(key)? {
            None => Ok(0),
            Some(StoredValue::Uint(value)) => Ok(value),
            Some(other) => Err(mismatch(path, "uint", &other)),
        }
    }

    fn address_array_at(&self, key: &StorageKey, path: &str) -> Result<Vec<Address>> {
        match self.store.get(key)? {
            None => Ok(Vec::new()),
            Some(StoredValue::AddressArray(value)) => Ok(value),
            Some(other) => Err(mismatch(path, "address[]", &other)),
        }
    }

    fn uint_array_at(&self, key: &StorageKey, path: &str) -> Result<Vec<u64>> {
        match self.store.get(key)? {
            None => Ok(Vec::new()),
            Some(StoredValue::UintArray(value)) => Ok(value),
            Some(other) => Err(mismatch(path, "uint[]", &other)),
        }
    }

    fn write(&self, key: StorageKey, path: &str, value: StoredValue) -> Result<()> {
        trace!("{} <- {} ({})", self.namespace, path, value.type_name());
        self.store.put(key, value)
    }

    // Scalars

    pub fn get_address(&self, path: &str) -> Result<Address> {
        self.address_at(&self.hash_key(path), path)
    }

    pub fn set_address(&self, path: &str, value: Address) -> Result<()> {
        self.write(self.hash_key(path), path, StoredValue::Address(value))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        self.bool_at(&self.hash_key(path), path)
    }

    pub fn set_bool(&self, path: &str, value: bool) -> Result<()> {
        self.write(self.hash_key(path), path, StoredValue::Bool(value))
    }

    pub fn get_uint(&self, path: &str) -> Result<u64> {
        self.uint_at(&self.hash_key(path), path)
    }

    pub fn set_uint(&self, path: &str, value: u64) -> Result<()> {
        self.write(self.hash_key(path), path, StoredValue::Uint(value))
    }

    /// True when any value, of any type, is stored at `path`.
    pub fn contains(&self, path: &str) -> Result<bool> {
        Ok(self.store.get(&self.hash_key(path))?.is_some())
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.store.delete(&self.hash_key(path))
    }

    // Arrays

    pub fn get_address_array(&self, path: &str) -> Result<Vec<Address>> {
        self.address_array_at(&self.hash_key(path), path)
    }

    pub fn set_address_array(&self, path: &str, values: Vec<Address>) -> Result<()> {
        self.write(self.hash_key(path), path, StoredValue::AddressArray(values))
    }

    pub fn get_address_array_length(&self, path: &str) -> Result<u64> {
        Ok(self.get_address_array(path)?.len() as u64)
    }

    pub fn get_address_array_item(&self, path: &str, index: u64) -> Result<Address> {
        let values = self.get_address_array(path)?;
        values
            .get(index as usize)
            .copied()
            .ok_or_else(|| StorageError::IndexOutOfBounds {
                path: path.to_string(),
                index,
                len: values.len() as u64,
            })
    }

    pub fn set_address_array_item(&self, path: &str, index: u64, value: Address) -> Result<()> {
        let mut values = self.get_address_array(path)?;
        let len = values.len() as u64;
        match values.get_mut(index as usize) {
            Some(slot) => *slot = value,
            None => {
                return Err(StorageError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len,
                })
            }
        }
        self.set_address_array(path, values)
    }

    /// Removes the item at `index`, shifting later items down by one.
    pub fn delete_address_array_item(&self, path: &str, index: u64) -> Result<Address> {
        let mut values = self.get_address_array(path)?;
        if index >= values.len() as u64 {
            return Err(StorageError::IndexOutOfBounds {
                path: path.to_string(),
                index,
                len: values.len() as u64,
            });
        }
        let removed = values.remove(index as usize);
        self.set_address_array(path, values)?;
        Ok(removed)
    }

    pub fn push_address(&self, path: &str, value: Address) -> Result<u64> {
        let mut values = self.get_address_array(path)?;
        values.push(value);
        let len = values.len() as u64;
        self.set_address_array(path, values)?;
        Ok(len)
    }

    pub fn get_uint_array(&self, path: &str) -> Result<Vec<u64>> {
        self.uint_array_at(&self.hash_key(path), path)
    }

    pub fn set_uint_array(&self, path: &str, values: Vec<u64>) -> Result<()> {
        self.write(self.hash_key(path), path, StoredValue::UintArray(values))
    }

    // Mappings keyed by address

    pub fn get_address_by_address(&self, path: &str, key: &Address) -> Result<Address> {
        self.address_at(&self.mapping_key(path, key), path)
    }

    pub fn set_address_by_address(&self, path: &str, key: &Address, value: Address) -> Result<()> {
        self.write(self.mapping_key(path, key), path, StoredValue::Address(value))
    }

    pub fn get_bool_by_address(&self, path: &str, key: &Address) -> Result<bool> {
        self.bool_at(&self.mapping_key(path, key), path)
    }

    pub fn set_bool_by_address(&self, path: &str, key: &Address, value: bool) -> Result<()> {
        self.write(self.mapping_key(path, key), path, StoredValue::Bool(value))
    }

    pub fn get_uint_by_address(&self, path: &str, key: &Address) -> Result<u64> {
        self.uint_at(&self.mapping_key(path, key), path)
    }

    pub fn set_uint_by_address(&self, path: &str, key: &Address, value: u64) -> Result<()> {
        self.write(self.mapping_key(path, key), path, StoredValue::Uint(value))
    }

    pub fn get_address_array_by_address(&self, path: &str, key: &Address) -> Result<Vec<Address>> {
        self.address_array_at(&self.mapping_key(path, key), path)
    }

    pub fn set_address_array_by_address(
        &self,
        path: &str,
        key: &Address,
        values: Vec<Address>,
    ) -> Result<()> {
        self.write(self.mapping_key(path, key), path, StoredValue::AddressArray(values))
    }

    pub fn get_uint_array_by_address(&self, path: &str, key: &Address) -> Result<Vec<u64>> {
        self.uint_array_at(&self.mapping_key(path, key), path)
    }

    pub fn set_uint_array_by_address(&self, path: &str, key: &Address, values: Vec<u64>) -> Result<()> {
        self.write(self.mapping_key(path, key), path, StoredValue::UintArray(values))
    }

    pub fn delete_mapping(&self, path: &str, key: &Address) -> Result<()> {
        self.store.delete(&self.mapping_key(path, key))
    }
}
