//! Validator key lifecycle management.
//!
//! [`KeyLifecycleManager`] runs the initial key ceremony, keeps each
//! validator's mining / payout / voting keys consistent, and drives the
//! validator-set coordinator whenever the set of mining keys changes. A
//! redeployed manager pulls state forward from its predecessor through the
//! read-only [`KeyLedger`] view.

pub mod audit_log;
pub mod error;
pub mod manager;

pub use error::{KeyError, Result};
pub use manager::{KeyLifecycleManager, KeyManagerConfig};

use poa_shared_types::{Address, InitialKeyState, ValidatorKeys};

/// Read access to a key manager's state, as used by a successor migrating from it.
pub trait KeyLedger: Send + Sync {
    fn address(&self) -> Address;
    fn get_initial_key(&self, key: &Address) -> Result<InitialKeyState>;
    fn get_validator_keys(&self, mining_key: &Address) -> Result<ValidatorKeys>;
    /// The mining key `mining_key` replaced in its last swap, or zero.
    fn get_mining_key_history(&self, mining_key: &Address) -> Result<Address>;
}
