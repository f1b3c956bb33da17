use poa_shared_types::{Address, ErrorKind, Role};
use poa_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Caller {caller} is not the {role}")]
    Unauthorized { caller: Address, role: Role },
    #[error("The zero address is not a valid validator")]
    InvalidAddress,
    #[error("Validator {0} is already pending")]
    DuplicateValidator(Address),
    #[error("{0} is not a pending validator")]
    NotAValidator(Address),
    #[error("The pending validator set is already finalized")]
    AlreadyFinalized,
    #[error("{supporter} already supports {validator}")]
    AlreadySupported { supporter: Address, validator: Address },
    #[error("{supporter} does not support {validator}")]
    NotSupported { supporter: Address, validator: Address },
    #[error("The validator support divisor must be positive")]
    InvalidSupportDivisor,
    #[error("Validator roster is limited to {limit} entries")]
    CapacityExceeded { limit: u64 },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T, E = ConsensusError> = std::result::Result<T, E>;

impl ConsensusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsensusError::Unauthorized { .. } => ErrorKind::Authorization,
            ConsensusError::InvalidAddress | ConsensusError::InvalidSupportDivisor => ErrorKind::Validation,
            ConsensusError::DuplicateValidator(_)
            | ConsensusError::NotAValidator(_)
            | ConsensusError::AlreadyFinalized
            | ConsensusError::AlreadySupported { .. }
            | ConsensusError::NotSupported { .. } => ErrorKind::StateConflict,
            ConsensusError::CapacityExceeded { .. } => ErrorKind::Capacity,
            ConsensusError::Storage(_) => ErrorKind::Storage,
        }
    }
}
