//! Validator-set coordination for the permissioned network.

pub mod coordinator;
pub mod error;

pub use coordinator::{ConsensusConfig, ValidatorMetadata, ValidatorSetCoordinator};
pub use error::{ConsensusError, Result};

use poa_shared_types::{Address, Call};

/// The validator-set capability the key manager drives.
///
/// `add_validator` and `remove_validator` are privileged: implementations
/// accept them only from the registered key manager.
pub trait ValidatorSet: Send + Sync {
    fn add_validator(&self, call: &Call, validator: Address) -> Result<()>;
    fn remove_validator(&self, call: &Call, validator: Address) -> Result<()>;
    fn is_validator(&self, validator: &Address) -> Result<bool>;
    fn get_validators(&self) -> Result<Vec<Address>>;
    fn get_pending_validators(&self) -> Result<Vec<Address>>;
    fn master_of_ceremony(&self) -> Result<Address>;
}
