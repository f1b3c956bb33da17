//! Wires the coordinator and the key manager over one shared store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use poa_consensus::{ConsensusError, ValidatorSet, ValidatorSetCoordinator};
use poa_keys::{KeyLedger, KeyLifecycleManager, KeyManagerConfig};
use poa_shared_types::{Address, Call, EventLog, EventRecord, Role};
use poa_storage::{KeyValueStore, MemoryStore, SledStore, StagedStore};

use crate::config::{NodeConfig, StorageBackend, StorageConfig};
use crate::error::{NodeError, Result};

/// Snapshot of the deployment reported by the `status` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub consensus: Address,
    pub key_manager: Address,
    /// Retired key managers, oldest first.
    pub retired_key_managers: Vec<Address>,
    pub master_of_ceremony: Address,
    pub voting_gateway: Address,
    pub system_address: Address,
    pub validators: Vec<Address>,
    pub pending_validators: Vec<Address>,
    pub finalized: bool,
    pub validator_count: u64,
    pub initial_key_count: u64,
    pub max_initial_validators: u64,
    pub max_total_validators: u64,
}

pub struct Deployment {
    store: Arc<StagedStore>,
    sled: Option<Arc<SledStore>>,
    events: Arc<EventLog>,
    consensus: Arc<ValidatorSetCoordinator>,
    key_manager: Arc<KeyLifecycleManager>,
    retired: Vec<Arc<KeyLifecycleManager>>,
}

impl Deployment {
    /// Deploys (or reattaches to) the coordinator and key manager chain.
    ///
    /// On a store that already holds a deployment the active key manager is
    /// the one the coordinator points at, and every predecessor it names is
    /// attached again so migration keeps working across restarts.
    pub fn open(config: &NodeConfig) -> Result<Self> {
        let (base, sled) = open_store(&config.storage)?;
        let events = Arc::new(EventLog::new());
        let store = Arc::new(StagedStore::new(base, events.clone()));
        let consensus = Arc::new(ValidatorSetCoordinator::deploy(
            store.clone(),
            config.consensus_config(),
        )?);

        let mut template = config.key_manager_config();
        let active = consensus.key_manager()?;
        if !active.is_zero() {
            template.address = active;
        }

        let mut retired = attach_key_managers(&store, &consensus, &template)?;
        let key_manager = match retired.pop() {
            Some(manager) => manager,
            None => Arc::new(deploy_manager(&store, &consensus, template, None)?),
        };

        info!(
            consensus = %consensus.address(),
            key_manager = %key_manager.address(),
            retired = retired.len(),
            "Deployment ready"
        );
        Ok(Self {
            store,
            sled,
            events,
            consensus,
            key_manager,
            retired,
        })
    }

    /// Replaces the active key manager with a fresh one at `address`.
    ///
    /// The new manager inherits the voting gateway and capacity of the
    /// current one and may migrate keys from it. Only the master of
    /// ceremony may redeploy. Seeding the successor and re-pointing the
    /// coordinator commit together.
    pub fn redeploy_key_manager(&mut self, call: &Call, address: Address) -> Result<()> {
        let master_of_ceremony = self.consensus.master_of_ceremony()?;
        if call.sender != master_of_ceremony {
            return Err(ConsensusError::Unauthorized {
                caller: call.sender,
                role: Role::MasterOfCeremony,
            }
            .into());
        }
        if address.is_zero() {
            return Err(ConsensusError::InvalidAddress.into());
        }
        if address == self.consensus.address() || self.managers().any(|m| m.address() == address) {
            return Err(NodeError::AddressInUse(address));
        }

        let current = self.key_manager.clone();
        let config = KeyManagerConfig {
            address,
            voting_gateway: current.get_voting_gateway()?,
            max_total_validators: current.get_max_total_validators()?,
        };
        let previous = Some(current.clone() as Arc<dyn KeyLedger>);
        let successor = self.store.atomically(|| -> Result<KeyLifecycleManager> {
            let successor = deploy_manager(&self.store, &self.consensus, config, previous)?;
            self.consensus.init_key_manager(call, address)?;
            Ok(successor)
        })?;

        info!(previous = %current.address(), key_manager = %address, "Key manager redeployed");
        self.retired.push(current);
        self.key_manager = Arc::new(successor);
        Ok(())
    }

    pub fn consensus(&self) -> &ValidatorSetCoordinator {
        &self.consensus
    }

    pub fn key_manager(&self) -> &KeyLifecycleManager {
        &self.key_manager
    }

    /// Retired key managers, oldest first.
    pub fn retired(&self) -> &[Arc<KeyLifecycleManager>] {
        &self.retired
    }

    fn managers(&self) -> impl Iterator<Item = &Arc<KeyLifecycleManager>> {
        self.retired.iter().chain(std::iter::once(&self.key_manager))
    }

    /// Removes and returns the events emitted since the last call.
    pub fn drain_events(&self) -> Vec<EventRecord> {
        self.events.drain()
    }

    pub fn status(&self) -> Result<DeploymentStatus> {
        let manager = &self.key_manager;
        Ok(DeploymentStatus {
            consensus: self.consensus.address(),
            key_manager: manager.address(),
            retired_key_managers: self.retired.iter().map(|m| m.address()).collect(),
            master_of_ceremony: manager.get_master_of_ceremony()?,
            voting_gateway: manager.get_voting_gateway()?,
            system_address: self.consensus.system_address()?,
            validators: self.consensus.get_validators()?,
            pending_validators: self.consensus.get_pending_validators()?,
            finalized: self.consensus.is_finalized()?,
            validator_count: manager.get_validator_count()?,
            initial_key_count: manager.get_initial_key_count()?,
            max_initial_validators: manager.get_max_initial_validators(),
            max_total_validators: manager.get_max_total_validators()?,
        })
    }

    /// Flushes the persistent backend, if any.
    pub fn flush(&self) -> Result<()> {
        if let Some(sled) = &self.sled {
            let bytes = sled.flush()?;
            debug!("Flushed {} bytes", bytes);
        }
        Ok(())
    }
}

fn deploy_manager(
    store: &Arc<StagedStore>,
    consensus: &Arc<ValidatorSetCoordinator>,
    config: KeyManagerConfig,
    previous: Option<Arc<dyn KeyLedger>>,
) -> Result<KeyLifecycleManager> {
    Ok(KeyLifecycleManager::deploy(
        store.clone(),
        consensus.clone(),
        previous,
        config,
    )?)
}

/// Attaches the manager at `template.address` and every predecessor it
/// names, returning the chain oldest first.
fn attach_key_managers(
    store: &Arc<StagedStore>,
    consensus: &Arc<ValidatorSetCoordinator>,
    template: &KeyManagerConfig,
) -> Result<Vec<Arc<KeyLifecycleManager>>> {
    let at = |address: Address| KeyManagerConfig {
        address,
        ..template.clone()
    };

    let mut addresses = vec![template.address];
    let mut cursor = deploy_manager(store, consensus, at(template.address), None)?
        .get_previous_key_manager()?;
    while !cursor.is_zero() && !addresses.contains(&cursor) {
        addresses.push(cursor);
        cursor = deploy_manager(store, consensus, at(cursor), None)?.get_previous_key_manager()?;
    }
    debug!("Key manager chain (newest first): {:?}", addresses);

    let mut chain: Vec<Arc<KeyLifecycleManager>> = Vec::with_capacity(addresses.len());
    for address in addresses.into_iter().rev() {
        let previous = chain
            .last()
            .map(|manager| manager.clone() as Arc<dyn KeyLedger>);
        chain.push(Arc::new(deploy_manager(store, consensus, at(address), previous)?));
    }
    Ok(chain)
}

fn open_store(config: &StorageConfig) -> Result<(Arc<dyn KeyValueStore>, Option<Arc<SledStore>>)> {
    match config.backend {
        StorageBackend::Memory => {
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            Ok((store, None))
        }
        StorageBackend::Sled => {
            let path = config.path.as_ref().ok_or(NodeError::MissingStoragePath)?;
            let sled = Arc::new(SledStore::open(path)?);
            info!("Using sled storage at {}", path.display());
            let store: Arc<dyn KeyValueStore> = sled.clone();
            Ok((store, Some(sled)))
        }
    }
}
