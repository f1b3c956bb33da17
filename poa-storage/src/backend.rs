//! Storage backends implementing [`KeyValueStore`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use log::debug;

use crate::error::{Result, StorageError};
use crate::key::StorageKey;
use crate::value::StoredValue;

const ETERNAL_TREE: &str = "eternal";

/// Raw persistence capability injected into every component.
///
/// Implementations use interior mutability so a single handle can be shared
/// by every component deployed over the same storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &StorageKey) -> Result<Option<StoredValue>>;
    fn put(&self, key: StorageKey, value: StoredValue) -> Result<()>;
    fn delete(&self, key: &StorageKey) -> Result<()>;
    /// Applies every write in `batch` or none of them.
    fn apply_batch(&self, batch: WriteBatch) -> Result<()>;
}

/// Ordered puts and deletes applied together by [`KeyValueStore::apply_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<(StorageKey, Option<StoredValue>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: StorageKey, value: StoredValue) {
        self.ops.push((key, Some(value)));
    }

    pub fn delete(&mut self, key: StorageKey) {
        self.ops.push((key, None));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = (StorageKey, Option<StoredValue>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Volatile store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StorageKey, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &StorageKey) -> Result<Option<StoredValue>> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: StorageKey, value: StoredValue) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn apply_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        for (key, value) in batch {
            match value {
                Some(value) => entries.insert(key, value),
                None => entries.remove(&key),
            };
        }
        Ok(())
    }
}

/// Sled-based persistent store.
///
/// Values are bincode-encoded [`StoredValue`]s in a single tree.
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Opens (or creates) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        debug!("Opened sled store at {}", path.as_ref().display());
        Self::from_db(db)
    }

    /// Opens a store that is removed when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(ETERNAL_TREE)?;
        Ok(Self { db, tree })
    }

    /// Flushes dirty buffers to disk, returning the number of bytes written.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &StorageKey) -> Result<Option<StoredValue>> {
        match self.tree.get(key.as_ref())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: StorageKey, value: StoredValue) -> Result<()> {
        let bytes = bincode::serialize(&value)?;
        self.tree.insert(key.as_ref(), bytes)?;
        Ok(())
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        self.tree.remove(key.as_ref())?;
        Ok(())
    }

    fn apply_batch(&self, batch: WriteBatch) -> Result<()> {
        let len = batch.len();
        let mut sled_batch = sled::Batch::default();
        for (key, value) in batch {
            match value {
                Some(value) => sled_batch.insert(key.as_ref(), bincode::serialize(&value)?),
                None => sled_batch.remove(key.as_ref()),
            }
        }
        self.tree.apply_batch(sled_batch)?;
        debug!("Applied batch of {} writes", len);
        Ok(())
    }
}
