//! Eternal storage shared by every deployed component.
//!
//! Components never own their state directly. They hold a [`Storage`]
//! handle scoped to their own address and read or write typed values by
//! logical path; the handle hashes each path into the component's key
//! space before touching the injected [`KeyValueStore`]. Operations that
//! must land together run inside a [`StagedStore`] scope.

pub mod backend;
pub mod error;
pub mod facade;
pub mod key;
pub mod staged;
pub mod value;

pub use backend::{KeyValueStore, MemoryStore, SledStore, WriteBatch};
pub use error::{Result, StorageError};
pub use facade::Storage;
pub use key::StorageKey;
pub use staged::StagedStore;
pub use value::StoredValue;
