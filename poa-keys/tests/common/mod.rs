#![allow(dead_code)]

use std::sync::Arc;

use poa_consensus::{ConsensusConfig, ValidatorSet, ValidatorSetCoordinator};
use poa_keys::{KeyLedger, KeyLifecycleManager, KeyManagerConfig};
use poa_shared_types::{Address, Call, Event, EventLog, ValidatorKeys};
use poa_storage::{KeyValueStore, MemoryStore, StagedStore};

pub const CONSENSUS: u64 = 0xc0;
pub const KEY_MANAGER: u64 = 0x4b;

/// Test account `i`. Account 0 is the master of ceremony.
pub fn acct(i: u64) -> Address {
    Address::from_low_u64(0x100 + i)
}

pub fn master_of_ceremony() -> Address {
    acct(0)
}

pub fn from(i: u64) -> Call {
    Call::new(acct(i))
}

/// Calls made by the voting gateway, which these tests point at account 0.
pub fn gateway() -> Call {
    from(0)
}

pub struct Network {
    pub store: Arc<StagedStore>,
    pub events: Arc<EventLog>,
    pub consensus: Arc<ValidatorSetCoordinator>,
    pub manager: Arc<KeyLifecycleManager>,
}

impl Network {
    pub fn new() -> Self {
        Self::over(Arc::new(MemoryStore::new()))
    }

    /// A network whose components share `base` as their eternal storage.
    pub fn over(base: Arc<dyn KeyValueStore>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let events = Arc::new(EventLog::new());
        let store = Arc::new(StagedStore::new(base, events.clone()));
        let consensus = Arc::new(
            ValidatorSetCoordinator::deploy(
                store.clone(),
                ConsensusConfig {
                    address: Address::from_low_u64(CONSENSUS),
                    master_of_ceremony: master_of_ceremony(),
                    key_manager: Address::from_low_u64(KEY_MANAGER),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let manager = Arc::new(
            KeyLifecycleManager::deploy(
                store.clone(),
                consensus.clone(),
                None,
                KeyManagerConfig {
                    address: Address::from_low_u64(KEY_MANAGER),
                    voting_gateway: master_of_ceremony(),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        Network {
            store,
            events,
            consensus,
            manager,
        }
    }

    /// Deploys a successor manager at `address` migrating from the current one.
    pub fn successor(&self, address: Address) -> KeyLifecycleManager {
        let previous: Arc<dyn KeyLedger> = self.manager.clone();
        KeyLifecycleManager::deploy(
            self.store.clone(),
            self.consensus.clone(),
            Some(previous),
            KeyManagerConfig {
                address,
                voting_gateway: master_of_ceremony(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    pub fn keys(&self, mining_key: Address) -> ValidatorKeys {
        self.manager.get_validator_keys(&mining_key).unwrap()
    }

    pub fn pending(&self) -> Vec<Address> {
        self.consensus.get_pending_validators().unwrap()
    }

    /// Events emitted by the key manager since the last call, oldest first.
    pub fn take_manager_events(&self) -> Vec<Event> {
        let manager = self.manager.address();
        self.events
            .drain()
            .into_iter()
            .filter(|record| record.emitter == manager)
            .map(|record| record.event)
            .collect()
    }

    pub fn finalize(&self) {
        self.consensus.finalize_change(&Call::new(Address::SYSTEM)).unwrap();
    }
}

pub fn record(payout: Address, voting: Address, mining: bool, payout_active: bool, voting_active: bool) -> ValidatorKeys {
    ValidatorKeys {
        payout_key: payout,
        voting_key: voting,
        is_mining_active: mining,
        is_payout_active: payout_active,
        is_voting_active: voting_active,
    }
}
