use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Index {index} out of bounds for array {path} of length {len}")]
    IndexOutOfBounds { path: String, index: u64, len: u64 },
    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<Box<bincode::ErrorKind>> for StorageError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

impl StorageError {
    pub fn kind(&self) -> poa_shared_types::ErrorKind {
        poa_shared_types::ErrorKind::Storage
    }
}
