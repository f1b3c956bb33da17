//! The key lifecycle manager.
//!
//! Every validator is identified by its mining key. The record kept for a
//! mining key links an optional payout key and an optional voting key, each
//! with its own activity flag. Both linked roles have a reverse index back to
//! the mining key so that no address can be bound to two validators at once.
//!
//! New validators enter either through the initial key ceremony (the master
//! of ceremony activates an initial key, which then registers a full triad
//! once) or through the voting gateway. Every change to the set of
//! mining-active keys is forwarded to the validator-set coordinator.
//!
//! Each public operation runs in one [`StagedStore`] scope shared with the
//! coordinator, so the roster change and the manager's own records commit
//! together or not at all.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use poa_consensus::ValidatorSet;
use poa_shared_types::{
    Address, Call, Event, EventSink, InitialKeyState, KeyAction, KeyTriad, MigratedKind, Role,
    ValidatorKeys, DEFAULT_MAX_TOTAL_VALIDATORS, MAX_INITIAL_VALIDATORS, MAX_VALIDATOR_COUNT,
};
use poa_storage::{StagedStore, Storage};

use crate::audit_log;
use crate::error::{KeyError, Result};
use crate::KeyLedger;

const INITIAL_KEYS: &str = "initialKeys";
const INITIAL_KEYS_CONSUMED: &str = "initialKeysConsumed";
const INITIAL_KEY_COUNT: &str = "initialKeyCount";
const PAYOUT_KEY: &str = "validators.payoutKey";
const VOTING_KEY: &str = "validators.votingKey";
const IS_MINING_ACTIVE: &str = "validators.isMiningActive";
const IS_PAYOUT_ACTIVE: &str = "validators.isPayoutActive";
const IS_VOTING_ACTIVE: &str = "validators.isVotingActive";
const MINING_KEY_BY_VOTING: &str = "miningKeyByVoting";
const MINING_KEY_BY_PAYOUT: &str = "miningKeyByPayout";
const MINING_KEY_HISTORY: &str = "miningKeyHistory";
const VALIDATOR_CLONES: &str = "validatorClones";
const VALIDATOR_COUNT: &str = "validatorCount";
const MAX_TOTAL_VALIDATORS: &str = "maxTotalValidators";
const MASTER_OF_CEREMONY: &str = "masterOfCeremony";
const VOTING_GATEWAY: &str = "votingGateway";
const PREVIOUS_KEY_MANAGER: &str = "previousKeyManager";
const INITIALIZED: &str = "initialized";

/// Deployment parameters of a [`KeyLifecycleManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManagerConfig {
    /// Address the manager is deployed at; namespaces its storage and is
    /// the caller the coordinator must accept.
    pub address: Address,
    /// Caller allowed to perform post-ceremony key management.
    pub voting_gateway: Address,
    pub max_total_validators: u64,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            address: Address::from_low_u64(0x4b),
            voting_gateway: Address::ZERO,
            max_total_validators: DEFAULT_MAX_TOTAL_VALIDATORS,
        }
    }
}

/// The linked key roles a validator record carries besides its mining key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Linked {
    Payout,
    Voting,
}

impl Linked {
    fn index(self) -> &'static str {
        match self {
            Linked::Payout => MINING_KEY_BY_PAYOUT,
            Linked::Voting => MINING_KEY_BY_VOTING,
        }
    }

    fn current(self, record: &ValidatorKeys) -> Option<Address> {
        match self {
            Linked::Payout => record.active_payout(),
            Linked::Voting => record.active_voting(),
        }
    }

    fn install(self, record: &mut ValidatorKeys, key: Address, active: bool) {
        match self {
            Linked::Payout => {
                record.payout_key = key;
                record.is_payout_active = active;
            }
            Linked::Voting => {
                record.voting_key = key;
                record.is_voting_active = active;
            }
        }
    }

    fn event(self, key: Address, mining_key: Address, action: KeyAction) -> Event {
        match self {
            Linked::Payout => Event::PayoutKeyChanged {
                key,
                mining_key,
                action,
            },
            Linked::Voting => Event::VotingKeyChanged {
                key,
                mining_key,
                action,
            },
        }
    }
}

pub struct KeyLifecycleManager {
    address: Address,
    storage: Storage,
    consensus: Arc<dyn ValidatorSet>,
    previous: Option<Arc<dyn KeyLedger>>,
    store: Arc<StagedStore>,
}

impl KeyLifecycleManager {
    /// Deploys a key manager over `store`.
    ///
    /// A fresh deployment seeds the master of ceremony (taken from the
    /// coordinator) as a mining-active validator. When `previous` is given the
    /// new manager may pull initial keys and mining keys forward from it, and
    /// the master of ceremony counts as already cloned. If the store already
    /// holds a manager at `config.address`, the handle attaches to it.
    ///
    /// # Arguments
    /// * `store` - Shared eternal storage, the one the coordinator uses;
    ///   also releases key lifecycle events once an operation commits
    /// * `consensus` - Validator set driven by mining key changes
    /// * `previous` - Read-only view of the manager being replaced
    /// * `config` - Address, voting gateway and capacity
    pub fn deploy(
        store: Arc<StagedStore>,
        consensus: Arc<dyn ValidatorSet>,
        previous: Option<Arc<dyn KeyLedger>>,
        config: KeyManagerConfig,
    ) -> Result<Self> {
        let manager = Self {
            address: config.address,
            storage: Storage::new(store.clone(), config.address),
            consensus,
            previous,
            store,
        };
        manager.store.atomically(|| manager.seed(&config))?;
        Ok(manager)
    }

    /// Seeds a fresh manager; a no-op when the store already holds one.
    fn seed(&self, config: &KeyManagerConfig) -> Result<()> {
        if self.storage.get_bool(INITIALIZED)? {
            info!("Attached to existing key manager at {}", config.address);
            return Ok(());
        }

        if config.max_total_validators > MAX_VALIDATOR_COUNT {
            return Err(KeyError::CapacityExceeded {
                limit: MAX_VALIDATOR_COUNT,
            });
        }
        let master_of_ceremony = self.consensus.master_of_ceremony()?;
        if master_of_ceremony.is_zero() {
            return Err(KeyError::InvalidAddress);
        }

        let storage = &self.storage;
        storage.set_address(MASTER_OF_CEREMONY, master_of_ceremony)?;
        storage.set_address(VOTING_GATEWAY, config.voting_gateway)?;
        storage.set_uint(MAX_TOTAL_VALIDATORS, config.max_total_validators)?;
        self.write_validator(&master_of_ceremony, &ValidatorKeys::mining_only())?;
        storage.set_uint(VALIDATOR_COUNT, 1)?;

        let previous_address = self.previous.as_ref().map(|previous| previous.address());
        if let Some(previous_address) = previous_address {
            storage.set_address(PREVIOUS_KEY_MANAGER, previous_address)?;
            storage.set_bool_by_address(VALIDATOR_CLONES, &master_of_ceremony, true)?;
        }
        storage.set_bool(INITIALIZED, true)?;

        audit_log::log_manager_deployed(config.address, master_of_ceremony, previous_address);
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Runs `op` as one unit of work, auditing any rejection.
    fn audited<T>(&self, operation: &str, call: &Call, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.store.atomically(op).map_err(|err| {
            audit_log::log_rejection(self.address, operation, call.sender, &err);
            err
        })
    }

    fn emit(&self, event: Event) {
        audit_log::log_key_event(self.address, &event);
        self.store.emit(self.address, event);
    }

    fn require(&self, call: &Call, role: Role, expected: Address) -> Result<()> {
        if expected.is_zero() || call.sender != expected {
            return Err(KeyError::Unauthorized {
                caller: call.sender,
                role,
            });
        }
        Ok(())
    }

    fn require_master_of_ceremony(&self, call: &Call) -> Result<()> {
        self.require(call, Role::MasterOfCeremony, self.get_master_of_ceremony()?)
    }

    fn require_voting_gateway(&self, call: &Call) -> Result<()> {
        self.require(call, Role::VotingGateway, self.get_voting_gateway()?)
    }

    /// The call this manager makes into the coordinator on behalf of `call`.
    fn consensus_call(&self, call: &Call) -> Call {
        call.forwarded_by(self.address)
    }

    // Record storage

    fn read_validator(&self, mining_key: &Address) -> Result<ValidatorKeys> {
        let storage = &self.storage;
        Ok(ValidatorKeys {
            payout_key: storage.get_address_by_address(PAYOUT_KEY, mining_key)?,
            voting_key: storage.get_address_by_address(VOTING_KEY, mining_key)?,
            is_mining_active: storage.get_bool_by_address(IS_MINING_ACTIVE, mining_key)?,
            is_payout_active: storage.get_bool_by_address(IS_PAYOUT_ACTIVE, mining_key)?,
            is_voting_active: storage.get_bool_by_address(IS_VOTING_ACTIVE, mining_key)?,
        })
    }

    fn write_validator(&self, mining_key: &Address, record: &ValidatorKeys) -> Result<()> {
        let storage = &self.storage;
        storage.set_address_by_address(PAYOUT_KEY, mining_key, record.payout_key)?;
        storage.set_address_by_address(VOTING_KEY, mining_key, record.voting_key)?;
        storage.set_bool_by_address(IS_MINING_ACTIVE, mining_key, record.is_mining_active)?;
        storage.set_bool_by_address(IS_PAYOUT_ACTIVE, mining_key, record.is_payout_active)?;
        storage.set_bool_by_address(IS_VOTING_ACTIVE, mining_key, record.is_voting_active)?;
        Ok(())
    }

    fn wipe_validator(&self, mining_key: &Address) -> Result<()> {
        for path in [PAYOUT_KEY, VOTING_KEY, IS_MINING_ACTIVE, IS_PAYOUT_ACTIVE, IS_VOTING_ACTIVE] {
            self.storage.delete_mapping(path, mining_key)?;
        }
        Ok(())
    }

    /// Points the reverse indexes of the record's linked keys at `mining_key`.
    fn index_linked_keys(&self, mining_key: &Address, record: &ValidatorKeys) -> Result<()> {
        for role in [Linked::Payout, Linked::Voting] {
            if let Some(key) = role.current(record) {
                self.storage.set_address_by_address(role.index(), &key, *mining_key)?;
            }
        }
        Ok(())
    }

    /// Clears the reverse indexes of the record's linked keys.
    fn unindex_linked_keys(&self, record: &ValidatorKeys) -> Result<()> {
        self.storage.delete_mapping(MINING_KEY_BY_PAYOUT, &record.payout_key)?;
        self.storage.delete_mapping(MINING_KEY_BY_VOTING, &record.voting_key)?;
        Ok(())
    }

    /// The mining key `key` is bound to in any role, if any.
    ///
    /// A pending validator this manager holds no record for (one still to be
    /// migrated from a predecessor) counts as bound to itself.
    fn binding_of(&self, key: &Address) -> Result<Option<Address>> {
        if self.is_mining_active(key)? {
            return Ok(Some(*key));
        }
        for path in [MINING_KEY_BY_VOTING, MINING_KEY_BY_PAYOUT] {
            let mining_key = self.storage.get_address_by_address(path, key)?;
            if !mining_key.is_zero() {
                return Ok(Some(mining_key));
            }
        }
        if self.consensus.is_validator(key)? {
            return Ok(Some(*key));
        }
        Ok(None)
    }

    fn require_capacity(&self) -> Result<()> {
        let limit = self.get_max_total_validators()?;
        if self.get_validator_count()? >= limit {
            return Err(KeyError::CapacityExceeded { limit });
        }
        Ok(())
    }

    fn adjust_validator_count(&self, added: bool) -> Result<()> {
        let count = self.get_validator_count()?;
        let count = if added { count + 1 } else { count.saturating_sub(1) };
        self.storage.set_uint(VALIDATOR_COUNT, count)?;
        Ok(())
    }

    fn require_mining_active(&self, mining_key: &Address) -> Result<ValidatorKeys> {
        let record = self.read_validator(mining_key)?;
        if !record.is_mining_active {
            return Err(KeyError::NotActive(*mining_key));
        }
        Ok(record)
    }

    // Initial key ceremony

    /// Activates `key` as an initial key. Master of ceremony only.
    pub fn initiate_keys(&self, call: &Call, key: Address) -> Result<()> {
        self.audited("initiate_keys", call, || {
            self.require_master_of_ceremony(call)?;
            if key.is_zero() || key == self.get_master_of_ceremony()? {
                return Err(KeyError::InvalidAddress);
            }
            if self.get_initial_key(&key)? != InitialKeyState::NonExistent
                || self.storage.get_bool_by_address(INITIAL_KEYS_CONSUMED, &key)?
                || self.is_mining_active(&key)?
            {
                return Err(KeyError::AlreadyInitiated(key));
            }
            let count = self.get_initial_key_count()?;
            if count >= MAX_INITIAL_VALIDATORS {
                return Err(KeyError::CeremonyCapExceeded {
                    limit: MAX_INITIAL_VALIDATORS,
                });
            }

            self.storage
                .set_uint_by_address(INITIAL_KEYS, &key, InitialKeyState::Activated.as_u64())?;
            self.storage.set_uint(INITIAL_KEY_COUNT, count + 1)?;
            self.emit(Event::InitialKeyCreated {
                initial_key: key,
                time: call.timestamp,
                initial_keys_count: count + 1,
            });
            Ok(())
        })
    }

    /// Registers a validator triad on behalf of the calling initial key.
    ///
    /// The initial key is consumed: it can neither register again nor be
    /// re-initiated.
    pub fn create_keys(&self, call: &Call, triad: KeyTriad) -> Result<()> {
        self.audited("create_keys", call, || {
            let initial_key = call.sender;
            if self.get_initial_key(&initial_key)? != InitialKeyState::Activated {
                return Err(KeyError::NotActivated(initial_key));
            }
            if triad.keys().iter().any(Address::is_zero) {
                return Err(KeyError::InvalidAddress);
            }
            if let Some(duplicate) = triad.first_duplicate() {
                return Err(KeyError::KeyCollision(duplicate));
            }
            let master_of_ceremony = self.get_master_of_ceremony()?;
            for key in triad.keys() {
                if key == initial_key || key == master_of_ceremony {
                    return Err(KeyError::KeyCollision(key));
                }
            }
            if self.is_mining_active(&triad.mining)? {
                return Err(KeyError::DuplicateKey(triad.mining));
            }
            for key in triad.keys() {
                if self.binding_of(&key)?.is_some() {
                    return Err(KeyError::KeyCollision(key));
                }
            }
            self.require_capacity()?;

            self.consensus
                .add_validator(&self.consensus_call(call), triad.mining)?;

            self.storage.delete_mapping(INITIAL_KEYS, &initial_key)?;
            self.storage
                .set_bool_by_address(INITIAL_KEYS_CONSUMED, &initial_key, true)?;
            let record = ValidatorKeys::from_triad(&triad);
            self.write_validator(&triad.mining, &record)?;
            self.index_linked_keys(&triad.mining, &record)?;
            self.adjust_validator_count(true)?;

            self.emit(Event::ValidatorInitialized {
                mining_key: triad.mining,
                payout_key: triad.payout,
                voting_key: triad.voting,
            });
            Ok(())
        })
    }

    // Mining keys

    /// Adds a bare mining key and proposes it to the validator set.
    pub fn add_mining_key(&self, call: &Call, mining_key: Address) -> Result<()> {
        self.audited("add_mining_key", call, || {
            self.require_voting_gateway(call)?;
            if mining_key.is_zero() {
                return Err(KeyError::InvalidAddress);
            }
            match self.binding_of(&mining_key)? {
                Some(bound) if bound == mining_key => return Err(KeyError::DuplicateKey(mining_key)),
                Some(_) => return Err(KeyError::KeyCollision(mining_key)),
                None => {}
            }
            self.require_capacity()?;

            self.consensus
                .add_validator(&self.consensus_call(call), mining_key)?;
            self.write_validator(&mining_key, &ValidatorKeys::mining_only())?;
            self.adjust_validator_count(true)?;

            self.emit(Event::MiningKeyChanged {
                key: mining_key,
                action: KeyAction::Added,
            });
            Ok(())
        })
    }

    /// Removes a mining key together with its linked keys.
    pub fn remove_mining_key(&self, call: &Call, mining_key: Address) -> Result<()> {
        self.audited("remove_mining_key", call, || {
            self.require_voting_gateway(call)?;
            let record = self.require_mining_active(&mining_key)?;

            self.consensus
                .remove_validator(&self.consensus_call(call), mining_key)?;
            self.unindex_linked_keys(&record)?;
            self.wipe_validator(&mining_key)?;
            self.adjust_validator_count(false)?;

            self.emit(Event::MiningKeyChanged {
                key: mining_key,
                action: KeyAction::Removed,
            });
            Ok(())
        })
    }

    /// Replaces `old_key` with `new_key`, carrying its linked keys over.
    ///
    /// A linked key equal to `new_key` is cleared (its activity flag is kept).
    pub fn swap_mining_key(&self, call: &Call, new_key: Address, old_key: Address) -> Result<()> {
        self.audited("swap_mining_key", call, || {
            self.require_voting_gateway(call)?;
            let mut record = self.require_mining_active(&old_key)?;
            if new_key.is_zero() {
                return Err(KeyError::InvalidAddress);
            }
            if self.is_mining_active(&new_key)? || self.consensus.is_validator(&new_key)? {
                return Err(KeyError::DuplicateKey(new_key));
            }
            if let Some(bound) = self.binding_of(&new_key)? {
                if bound != old_key {
                    return Err(KeyError::KeyCollision(new_key));
                }
            }

            let consensus_call = self.consensus_call(call);
            self.consensus.remove_validator(&consensus_call, old_key)?;
            self.consensus.add_validator(&consensus_call, new_key)?;

            if record.payout_key == new_key {
                self.storage.delete_mapping(MINING_KEY_BY_PAYOUT, &new_key)?;
                record.payout_key = Address::ZERO;
            }
            if record.voting_key == new_key {
                self.storage.delete_mapping(MINING_KEY_BY_VOTING, &new_key)?;
                record.voting_key = Address::ZERO;
            }
            self.write_validator(&new_key, &record)?;
            self.index_linked_keys(&new_key, &record)?;
            self.storage
                .set_address_by_address(MINING_KEY_HISTORY, &new_key, old_key)?;
            self.wipe_validator(&old_key)?;

            self.emit(Event::MiningKeyChanged {
                key: old_key,
                action: KeyAction::Removed,
            });
            self.emit(Event::MiningKeyChanged {
                key: new_key,
                action: KeyAction::Added,
            });
            Ok(())
        })
    }

    // Voting and payout keys

    fn check_linked_key(&self, role: Linked, key: Address, mining_key: Address, record: &ValidatorKeys) -> Result<()> {
        if key.is_zero() {
            return Err(KeyError::InvalidAddress);
        }
        if role.current(record) == Some(key) {
            return Err(KeyError::DuplicateKey(key));
        }
        match self.binding_of(&key)? {
            Some(bound) if bound != mining_key || key == mining_key => Err(KeyError::KeyCollision(key)),
            _ => Ok(()),
        }
    }

    fn detach_linked_key(&self, role: Linked, record: &mut ValidatorKeys) -> Result<Option<Address>> {
        let current = role.current(record);
        if let Some(key) = current {
            self.storage.delete_mapping(role.index(), &key)?;
        }
        role.install(record, Address::ZERO, false);
        Ok(current)
    }

    fn attach_linked_key(&self, role: Linked, key: Address, mining_key: Address, record: &mut ValidatorKeys) -> Result<()> {
        role.install(record, key, true);
        self.storage.set_address_by_address(role.index(), &key, mining_key)?;
        Ok(())
    }

    fn add_linked_key(&self, call: &Call, role: Linked, key: Address, mining_key: Address) -> Result<()> {
        self.require_voting_gateway(call)?;
        let mut record = self.require_mining_active(&mining_key)?;
        self.check_linked_key(role, key, mining_key, &record)?;

        if let Some(replaced) = self.detach_linked_key(role, &mut record)? {
            debug!("Replacing {:?} key {} of {}", role, replaced, mining_key);
        }
        self.attach_linked_key(role, key, mining_key, &mut record)?;
        self.write_validator(&mining_key, &record)?;

        self.emit(role.event(key, mining_key, KeyAction::Added));
        Ok(())
    }

    fn remove_linked_key(&self, call: &Call, role: Linked, mining_key: Address) -> Result<()> {
        self.require_voting_gateway(call)?;
        let mut record = self.require_mining_active(&mining_key)?;
        let removed = self
            .detach_linked_key(role, &mut record)?
            .ok_or(KeyError::NotActive(mining_key))?;
        self.write_validator(&mining_key, &record)?;

        self.emit(role.event(removed, mining_key, KeyAction::Removed));
        Ok(())
    }

    fn swap_linked_key(&self, call: &Call, role: Linked, key: Address, mining_key: Address) -> Result<()> {
        self.require_voting_gateway(call)?;
        let mut record = self.require_mining_active(&mining_key)?;
        if role.current(&record).is_none() {
            return Err(KeyError::NotActive(mining_key));
        }
        self.check_linked_key(role, key, mining_key, &record)?;

        let removed = self.detach_linked_key(role, &mut record)?;
        self.attach_linked_key(role, key, mining_key, &mut record)?;
        self.write_validator(&mining_key, &record)?;

        if let Some(removed) = removed {
            self.emit(role.event(removed, mining_key, KeyAction::Removed));
        }
        self.emit(role.event(key, mining_key, KeyAction::Added));
        Ok(())
    }

    /// Links a voting key to an active mining key, replacing any current one.
    pub fn add_voting_key(&self, call: &Call, voting_key: Address, mining_key: Address) -> Result<()> {
        self.audited("add_voting_key", call, || {
            self.add_linked_key(call, Linked::Voting, voting_key, mining_key)
        })
    }

    /// Links a payout key to an active mining key, replacing any current one.
    pub fn add_payout_key(&self, call: &Call, payout_key: Address, mining_key: Address) -> Result<()> {
        self.audited("add_payout_key", call, || {
            self.add_linked_key(call, Linked::Payout, payout_key, mining_key)
        })
    }

    pub fn remove_voting_key(&self, call: &Call, mining_key: Address) -> Result<()> {
        self.audited("remove_voting_key", call, || {
            self.remove_linked_key(call, Linked::Voting, mining_key)
        })
    }

    pub fn remove_payout_key(&self, call: &Call, mining_key: Address) -> Result<()> {
        self.audited("remove_payout_key", call, || {
            self.remove_linked_key(call, Linked::Payout, mining_key)
        })
    }

    /// Replaces the current voting key of `mining_key`, which must exist.
    pub fn swap_voting_key(&self, call: &Call, voting_key: Address, mining_key: Address) -> Result<()> {
        self.audited("swap_voting_key", call, || {
            self.swap_linked_key(call, Linked::Voting, voting_key, mining_key)
        })
    }

    /// Replaces the current payout key of `mining_key`, which must exist.
    pub fn swap_payout_key(&self, call: &Call, payout_key: Address, mining_key: Address) -> Result<()> {
        self.audited("swap_payout_key", call, || {
            self.swap_linked_key(call, Linked::Payout, payout_key, mining_key)
        })
    }

    // Administration

    pub fn set_voting_gateway(&self, call: &Call, voting_gateway: Address) -> Result<()> {
        self.audited("set_voting_gateway", call, || {
            self.require_master_of_ceremony(call)?;
            if voting_gateway.is_zero() {
                return Err(KeyError::InvalidAddress);
            }
            self.storage.set_address(VOTING_GATEWAY, voting_gateway)?;
            info!("Voting gateway of {} set to {}", self.address, voting_gateway);
            Ok(())
        })
    }

    pub fn set_max_total_validators(&self, call: &Call, max_total_validators: u64) -> Result<()> {
        self.audited("set_max_total_validators", call, || {
            self.require_voting_gateway(call)?;
            if max_total_validators > MAX_VALIDATOR_COUNT {
                return Err(KeyError::CapacityExceeded {
                    limit: MAX_VALIDATOR_COUNT,
                });
            }
            self.storage.set_uint(MAX_TOTAL_VALIDATORS, max_total_validators)?;
            info!("Max total validators of {} set to {}", self.address, max_total_validators);
            Ok(())
        })
    }

    // Migration

    fn previous_ledger(&self, key: Address) -> Result<&Arc<dyn KeyLedger>> {
        self.previous.as_ref().ok_or(KeyError::NotEligible(key))
    }

    /// Pulls an activated, unconsumed initial key forward from the previous manager.
    pub fn migrate_initial_key(&self, call: &Call, key: Address) -> Result<()> {
        self.audited("migrate_initial_key", call, || {
            let previous = self.previous_ledger(key)?;
            if previous.get_initial_key(&key)? != InitialKeyState::Activated
                || self.get_initial_key(&key)? != InitialKeyState::NonExistent
                || self.storage.get_bool_by_address(INITIAL_KEYS_CONSUMED, &key)?
            {
                return Err(KeyError::NotEligible(key));
            }
            let count = self.get_initial_key_count()?;
            if count >= MAX_INITIAL_VALIDATORS {
                return Err(KeyError::CeremonyCapExceeded {
                    limit: MAX_INITIAL_VALIDATORS,
                });
            }

            self.storage
                .set_uint_by_address(INITIAL_KEYS, &key, InitialKeyState::Activated.as_u64())?;
            self.storage.set_uint(INITIAL_KEY_COUNT, count + 1)?;
            self.emit(Event::Migrated {
                key,
                name: MigratedKind::InitialKey,
            });
            Ok(())
        })
    }

    /// Clones a mining-active validator record from the previous manager.
    ///
    /// The validator set is not touched: the mining key is already a member.
    pub fn migrate_mining_key(&self, call: &Call, mining_key: Address) -> Result<()> {
        self.audited("migrate_mining_key", call, || {
            let previous = self.previous_ledger(mining_key)?;
            if self.has_validator_clone(&mining_key)? {
                return Err(KeyError::AlreadyCloned(mining_key));
            }
            let record = previous.get_validator_keys(&mining_key)?;
            if !record.is_mining_active {
                return Err(KeyError::NotEligible(mining_key));
            }
            if self.is_mining_active(&mining_key)? {
                return Err(KeyError::DuplicateKey(mining_key));
            }
            if let Some(bound) = self.binding_of(&mining_key)? {
                if bound != mining_key {
                    return Err(KeyError::KeyCollision(mining_key));
                }
            }
            for key in [Linked::Payout, Linked::Voting]
                .into_iter()
                .filter_map(|role| role.current(&record))
            {
                match self.binding_of(&key)? {
                    Some(bound) if bound != mining_key => return Err(KeyError::KeyCollision(key)),
                    _ => {}
                }
            }
            self.require_capacity()?;

            self.write_validator(&mining_key, &record)?;
            self.index_linked_keys(&mining_key, &record)?;
            let history = previous.get_mining_key_history(&mining_key)?;
            if !history.is_zero() {
                self.storage
                    .set_address_by_address(MINING_KEY_HISTORY, &mining_key, history)?;
            }
            self.storage
                .set_bool_by_address(VALIDATOR_CLONES, &mining_key, true)?;
            self.adjust_validator_count(true)?;

            self.emit(Event::Migrated {
                key: mining_key,
                name: MigratedKind::MiningKey,
            });
            Ok(())
        })
    }

    // Queries

    pub fn get_master_of_ceremony(&self) -> Result<Address> {
        Ok(self.storage.get_address(MASTER_OF_CEREMONY)?)
    }

    pub fn get_voting_gateway(&self) -> Result<Address> {
        Ok(self.storage.get_address(VOTING_GATEWAY)?)
    }

    /// Address of the manager this one migrates from, or zero.
    pub fn get_previous_key_manager(&self) -> Result<Address> {
        Ok(self.storage.get_address(PREVIOUS_KEY_MANAGER)?)
    }

    pub fn get_max_initial_validators(&self) -> u64 {
        MAX_INITIAL_VALIDATORS
    }

    pub fn get_max_total_validators(&self) -> Result<u64> {
        Ok(self.storage.get_uint(MAX_TOTAL_VALIDATORS)?)
    }

    pub fn get_initial_key_count(&self) -> Result<u64> {
        Ok(self.storage.get_uint(INITIAL_KEY_COUNT)?)
    }

    /// Number of mining-active validators, the master of ceremony included.
    pub fn get_validator_count(&self) -> Result<u64> {
        Ok(self.storage.get_uint(VALIDATOR_COUNT)?)
    }

    pub fn is_mining_active(&self, mining_key: &Address) -> Result<bool> {
        Ok(self.storage.get_bool_by_address(IS_MINING_ACTIVE, mining_key)?)
    }

    pub fn is_payout_active(&self, mining_key: &Address) -> Result<bool> {
        Ok(self.storage.get_bool_by_address(IS_PAYOUT_ACTIVE, mining_key)?)
    }

    /// Whether `voting_key` is the active voting key of some validator.
    pub fn is_voting_active(&self, voting_key: &Address) -> Result<bool> {
        let mining_key = self.get_mining_key_by_voting(voting_key)?;
        if mining_key.is_zero() {
            return Ok(false);
        }
        Ok(self.storage.get_bool_by_address(IS_VOTING_ACTIVE, &mining_key)?)
    }

    pub fn get_mining_key_by_voting(&self, voting_key: &Address) -> Result<Address> {
        Ok(self.storage.get_address_by_address(MINING_KEY_BY_VOTING, voting_key)?)
    }

    pub fn get_mining_key_by_payout(&self, payout_key: &Address) -> Result<Address> {
        Ok(self.storage.get_address_by_address(MINING_KEY_BY_PAYOUT, payout_key)?)
    }

    pub fn has_validator_clone(&self, mining_key: &Address) -> Result<bool> {
        Ok(self.storage.get_bool_by_address(VALIDATOR_CLONES, mining_key)?)
    }
}

impl KeyLedger for KeyLifecycleManager {
    fn address(&self) -> Address {
        self.address
    }

    fn get_initial_key(&self, key: &Address) -> Result<InitialKeyState> {
        let state = self.storage.get_uint_by_address(INITIAL_KEYS, key)?;
        Ok(InitialKeyState::from_u64(state))
    }

    fn get_validator_keys(&self, mining_key: &Address) -> Result<ValidatorKeys> {
        self.read_validator(mining_key)
    }

    fn get_mining_key_history(&self, mining_key: &Address) -> Result<Address> {
        Ok(self.storage.get_address_by_address(MINING_KEY_HISTORY, mining_key)?)
    }
}
