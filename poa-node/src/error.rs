use poa_consensus::ConsensusError;
use poa_keys::KeyError;
use poa_shared_types::{Address, ErrorKind};
use poa_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("The sled backend requires storage.path")]
    MissingStoragePath,
    #[error("Address {0} already hosts a key manager")]
    AddressInUse(Address),
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = NodeError> = std::result::Result<T, E>;

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Config(_)
            | NodeError::MissingStoragePath
            | NodeError::AddressInUse(_)
            | NodeError::BadRequest(_) => ErrorKind::Validation,
            NodeError::Keys(err) => err.kind(),
            NodeError::Consensus(err) => err.kind(),
            NodeError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::BadRequest(err.to_string())
    }
}
