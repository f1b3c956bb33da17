//! All-or-nothing units of work over a [`KeyValueStore`].
//!
//! Components that cooperate on one operation share a single
//! [`StagedStore`]. Inside [`StagedStore::atomically`] every write and every
//! emitted event is held back; when the outermost scope succeeds the writes
//! reach the base store as one [`WriteBatch`] and only then are the events
//! released to the sink. A failing scope leaves neither behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};

use poa_shared_types::{Address, Event, EventRecord, EventSink};

use crate::backend::{KeyValueStore, WriteBatch};
use crate::error::{Result, StorageError};
use crate::key::StorageKey;
use crate::value::StoredValue;

#[derive(Default)]
struct Staging {
    depth: usize,
    writes: HashMap<StorageKey, Option<StoredValue>>,
    events: Vec<EventRecord>,
}

pub struct StagedStore {
    base: Arc<dyn KeyValueStore>,
    sink: Arc<dyn EventSink>,
    staging: Mutex<Staging>,
}

impl StagedStore {
    pub fn new(base: Arc<dyn KeyValueStore>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            base,
            sink,
            staging: Mutex::new(Staging::default()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Staging> {
        self.staging.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `op` as one unit of work.
    ///
    /// Nested scopes join the outermost one, which alone commits or rolls
    /// back. A commit that the base store rejects is reported as the scope's
    /// error and nothing is kept. Scopes are not isolated from each other,
    /// so callers sharing one store across threads must serialize operations.
    pub fn atomically<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let scope = Scope::enter(self);
        let result = op();
        scope.finish(result.is_ok())?;
        result
    }

    pub fn in_scope(&self) -> bool {
        self.guard().depth > 0
    }

    /// Number of writes held back by the open scope.
    pub fn staged_len(&self) -> usize {
        self.guard().writes.len()
    }

    fn stage(&self, key: StorageKey, value: Option<StoredValue>) -> Result<()> {
        {
            let mut staging = self.guard();
            if staging.depth > 0 {
                staging.writes.insert(key, value);
                return Ok(());
            }
        }
        match value {
            Some(value) => self.base.put(key, value),
            None => self.base.delete(&key),
        }
    }

    fn commit(&self) -> Result<()> {
        let (writes, events) = {
            let mut staging = self.guard();
            (
                std::mem::take(&mut staging.writes),
                std::mem::take(&mut staging.events),
            )
        };
        if !writes.is_empty() {
            let mut batch = WriteBatch::new();
            for (key, value) in writes {
                match value {
                    Some(value) => batch.put(key, value),
                    None => batch.delete(key),
                }
            }
            trace!("Committing {} staged writes", batch.len());
            self.base.apply_batch(batch)?;
        }
        for record in events {
            self.sink.emit(record.emitter, record.event);
        }
        Ok(())
    }

    fn rollback(&self) {
        let mut staging = self.guard();
        if !staging.writes.is_empty() || !staging.events.is_empty() {
            debug!(
                "Discarding {} staged writes and {} events",
                staging.writes.len(),
                staging.events.len()
            );
        }
        staging.writes.clear();
        staging.events.clear();
    }
}

/// One level of [`StagedStore::atomically`]. Dropping an unfinished
/// outermost scope (on panic) discards what it staged.
struct Scope<'a> {
    store: &'a StagedStore,
    outermost: bool,
    finished: bool,
}

impl<'a> Scope<'a> {
    fn enter(store: &'a StagedStore) -> Self {
        let mut staging = store.guard();
        staging.depth += 1;
        Self {
            store,
            outermost: staging.depth == 1,
            finished: false,
        }
    }

    fn leave(&mut self) {
        self.finished = true;
        let mut staging = self.store.guard();
        staging.depth = staging.depth.saturating_sub(1);
    }

    fn finish(mut self, succeeded: bool) -> Result<()> {
        self.leave();
        if !self.outermost {
            return Ok(());
        }
        if !succeeded {
            self.store.rollback();
            return Ok(());
        }
        self.store.commit().map_err(|err| {
            self.store.rollback();
            err
        })
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.leave();
            if self.outermost {
                self.store.rollback();
            }
        }
    }
}

impl KeyValueStore for StagedStore {
    fn get(&self, key: &StorageKey) -> Result<Option<StoredValue>> {
        if let Some(staged) = self.guard().writes.get(key) {
            return Ok(staged.clone());
        }
        self.base.get(key)
    }

    fn put(&self, key: StorageKey, value: StoredValue) -> Result<()> {
        self.stage(key, Some(value))
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        self.stage(*key, None)
    }

    fn apply_batch(&self, batch: WriteBatch) -> Result<()> {
        if !self.in_scope() {
            return self.base.apply_batch(batch);
        }
        for (key, value) in batch {
            self.stage(key, value)?;
        }
        Ok(())
    }
}

impl EventSink for StagedStore {
    fn emit(&self, emitter: Address, event: Event) {
        let mut staging = self.guard();
        if staging.depth > 0 {
            staging.events.push(EventRecord { emitter, event });
            return;
        }
        drop(staging);
        self.sink.emit(emitter, event);
    }
}
