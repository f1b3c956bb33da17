//! Node configuration: a TOML file overlaid by `POA__*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use poa_consensus::ConsensusConfig;
use poa_keys::KeyManagerConfig;
use poa_shared_types::{Address, DEFAULT_MAX_TOTAL_VALIDATORS};

const ENV_PREFIX: &str = "POA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database directory, required by the sled backend.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub master_of_ceremony: Address,
    pub system_address: Address,
    pub voting_gateway: Address,
    pub consensus_address: Address,
    pub key_manager_address: Address,
    /// Validators seeded after the master of ceremony on a fresh deployment.
    pub initial_validators: Vec<Address>,
    pub max_total_validators: Option<u64>,
    pub storage: StorageConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let consensus = ConsensusConfig::default();
        let key_manager = KeyManagerConfig::default();
        Self {
            master_of_ceremony: Address::ZERO,
            system_address: consensus.system_address,
            voting_gateway: Address::ZERO,
            consensus_address: consensus.address,
            key_manager_address: key_manager.address,
            initial_validators: Vec::new(),
            max_total_validators: None,
            storage: StorageConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            address: self.consensus_address,
            master_of_ceremony: self.master_of_ceremony,
            system_address: self.system_address,
            key_manager: self.key_manager_address,
            initial_validators: self.initial_validators.clone(),
        }
    }

    pub fn key_manager_config(&self) -> KeyManagerConfig {
        KeyManagerConfig {
            address: self.key_manager_address,
            voting_gateway: self.voting_gateway,
            max_total_validators: self
                .max_total_validators
                .unwrap_or(DEFAULT_MAX_TOTAL_VALIDATORS),
        }
    }
}

/// Loads the configuration from `path` (if any) and the environment.
///
/// Environment variables use the `POA__` prefix and `__` as the nesting
/// separator, e.g. `POA__STORAGE__BACKEND=sled`.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig, ::config::ConfigError> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::from(path));
    }
    builder
        .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()
}
