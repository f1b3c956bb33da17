use poa_consensus::ConsensusError;
use poa_shared_types::{Address, ErrorKind, Role};
use poa_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Caller {caller} is not the {role}")]
    Unauthorized { caller: Address, role: Role },
    #[error("Invalid address supplied")]
    InvalidAddress,
    #[error("Initial key {0} was already initiated")]
    AlreadyInitiated(Address),
    #[error("Initial key ceremony is limited to {limit} keys")]
    CeremonyCapExceeded { limit: u64 },
    #[error("{0} does not hold an activated initial key")]
    NotActivated(Address),
    #[error("Key {0} collides with another key or a protected address")]
    KeyCollision(Address),
    #[error("Key {0} is already active")]
    DuplicateKey(Address),
    #[error("Mining-active validators are limited to {limit}")]
    CapacityExceeded { limit: u64 },
    #[error("Key {0} is not active")]
    NotActive(Address),
    #[error("Key {0} is not eligible for migration")]
    NotEligible(Address),
    #[error("Mining key {0} was already cloned from the previous key manager")]
    AlreadyCloned(Address),
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T, E = KeyError> = std::result::Result<T, E>;

impl KeyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyError::Unauthorized { .. } => ErrorKind::Authorization,
            KeyError::InvalidAddress | KeyError::KeyCollision(_) => ErrorKind::Validation,
            KeyError::AlreadyInitiated(_)
            | KeyError::NotActivated(_)
            | KeyError::DuplicateKey(_)
            | KeyError::NotActive(_) => ErrorKind::StateConflict,
            KeyError::CeremonyCapExceeded { .. } | KeyError::CapacityExceeded { .. } => {
                ErrorKind::Capacity
            }
            KeyError::NotEligible(_) | KeyError::AlreadyCloned(_) => ErrorKind::Migration,
            KeyError::Consensus(err) => err.kind(),
            KeyError::Storage(_) => ErrorKind::Storage,
        }
    }
}
