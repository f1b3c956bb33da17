//! Pending / finalized validator-set state machine.
//!
//! The coordinator keeps two rosters. The pending roster is mutated by the
//! key manager whenever a mining key is added or removed; the finalized
//! roster is a snapshot of the pending one taken when the system caller
//! commits the change. The sealing engine only ever acts on the finalized
//! roster and learns about proposed changes through `InitiateChange`.
//!
//! Pending validators also vouch for each other. Every validator supports
//! itself from the moment it joins; a validator is sufficiently supported
//! once `pending / divisor + 1` members back it.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use poa_shared_types::{
    Address, Call, Event, EventSink, Role, DEFAULT_VALIDATOR_SUPPORT_DIVISOR, MAX_INITIAL_VALIDATORS,
    MAX_VALIDATOR_COUNT,
};
use poa_storage::{StagedStore, Storage};

use crate::error::{ConsensusError, Result};
use crate::ValidatorSet;

const MASTER_OF_CEREMONY: &str = "masterOfCeremony";
const SYSTEM_ADDRESS: &str = "systemAddress";
const KEY_MANAGER: &str = "keyManager";
const PENDING_VALIDATORS: &str = "pendingValidators";
const VALIDATORS: &str = "validators";
const FINALIZED: &str = "finalized";
const METADATA_IS_VALIDATOR: &str = "validatorMetadata.isValidator";
const METADATA_ADDED_AT: &str = "validatorMetadata.addedAt";
const SUPPORT_DIVISOR: &str = "validatorSupportDivisor";
const SUPPORTERS: &str = "validatorSupporters";
const INITIALIZED: &str = "initialized";

/// Deployment parameters of a [`ValidatorSetCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Address the coordinator is deployed at; namespaces its storage.
    pub address: Address,
    /// Bootstrap authority, always the first pending validator.
    pub master_of_ceremony: Address,
    /// Caller allowed to finalize pending changes.
    pub system_address: Address,
    /// Caller allowed to add and remove validators. May be set later.
    pub key_manager: Address,
    /// Extra validators seeded after the ceremony master, e.g. on redeploy.
    pub initial_validators: Vec<Address>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            address: Address::from_low_u64(0xc0),
            master_of_ceremony: Address::ZERO,
            system_address: Address::SYSTEM,
            key_manager: Address::ZERO,
            initial_validators: Vec::new(),
        }
    }
}

/// Membership metadata kept for each pending validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorMetadata {
    pub is_validator: bool,
    /// Timestamp of the call that added the validator.
    pub added_at: u64,
    /// Pending validators backing this one, itself included.
    pub support_count: u64,
}

pub struct ValidatorSetCoordinator {
    address: Address,
    storage: Storage,
    store: Arc<StagedStore>,
}

impl ValidatorSetCoordinator {
    /// Deploys a coordinator over `store`.
    ///
    /// If the store already holds a coordinator at `config.address` the new
    /// handle attaches to it and `config` is ignored; otherwise the roster is
    /// seeded with the ceremony master followed by `config.initial_validators`.
    ///
    /// # Arguments
    /// * `store` - Shared eternal storage; also releases `InitiateChange`
    ///   and `ChangeFinalized` once an operation commits
    /// * `config` - Roles and seed roster
    pub fn deploy(store: Arc<StagedStore>, config: ConsensusConfig) -> Result<Self> {
        let coordinator = Self {
            address: config.address,
            storage: Storage::new(store.clone(), config.address),
            store,
        };
        coordinator.store.atomically(|| coordinator.seed(config))?;
        Ok(coordinator)
    }

    /// Seeds a fresh roster; a no-op when the store already holds one.
    fn seed(&self, config: ConsensusConfig) -> Result<()> {
        if self.storage.get_bool(INITIALIZED)? {
            info!("Attached to existing validator set coordinator at {}", config.address);
            return Ok(());
        }

        if config.master_of_ceremony.is_zero() || config.system_address.is_zero() {
            return Err(ConsensusError::InvalidAddress);
        }

        let mut roster = vec![config.master_of_ceremony];
        for validator in config.initial_validators {
            if validator.is_zero() || roster.contains(&validator) {
                debug!("Skipping seed validator {}", validator);
                continue;
            }
            roster.push(validator);
        }
        if roster.len() as u64 > MAX_VALIDATOR_COUNT {
            return Err(ConsensusError::CapacityExceeded {
                limit: MAX_VALIDATOR_COUNT,
            });
        }

        let storage = &self.storage;
        storage.set_address(MASTER_OF_CEREMONY, config.master_of_ceremony)?;
        storage.set_address(SYSTEM_ADDRESS, config.system_address)?;
        storage.set_address(KEY_MANAGER, config.key_manager)?;
        storage.set_uint(SUPPORT_DIVISOR, DEFAULT_VALIDATOR_SUPPORT_DIVISOR)?;
        for validator in &roster {
            storage.set_bool_by_address(METADATA_IS_VALIDATOR, validator, true)?;
            storage.set_address_array_by_address(SUPPORTERS, validator, vec![*validator])?;
        }
        storage.set_address_array(PENDING_VALIDATORS, roster.clone())?;
        storage.set_address_array(VALIDATORS, roster.clone())?;
        storage.set_bool(FINALIZED, false)?;
        storage.set_bool(INITIALIZED, true)?;

        info!(
            "Deployed validator set coordinator at {} with {} seeded validators",
            config.address,
            roster.len()
        );
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn require(&self, call: &Call, role: Role, expected: Address) -> Result<()> {
        if call.sender != expected {
            warn!("Rejected call from {}: not the {}", call.sender, role);
            return Err(ConsensusError::Unauthorized {
                caller: call.sender,
                role,
            });
        }
        Ok(())
    }

    fn require_key_manager(&self, call: &Call) -> Result<()> {
        let key_manager = self.key_manager()?;
        // An unset key manager must never match the zero caller.
        if key_manager.is_zero() {
            return Err(ConsensusError::Unauthorized {
                caller: call.sender,
                role: Role::KeyManager,
            });
        }
        self.require(call, Role::KeyManager, key_manager)
    }

    fn require_pending_validator(&self, call: &Call) -> Result<()> {
        if !self.is_validator(&call.sender)? {
            return Err(ConsensusError::Unauthorized {
                caller: call.sender,
                role: Role::Validator,
            });
        }
        Ok(())
    }

    fn initiate_change(&self, pending: Vec<Address>) -> Result<()> {
        self.storage.set_address_array(PENDING_VALIDATORS, pending.clone())?;
        self.storage.set_bool(FINALIZED, false)?;
        self.store.emit(self.address, Event::InitiateChange { new_set: pending });
        Ok(())
    }

    /// Commits the pending roster as the active validator set.
    pub fn finalize_change(&self, call: &Call) -> Result<()> {
        self.store.atomically(|| {
            self.require(call, Role::System, self.system_address()?)?;
            if self.is_finalized()? {
                return Err(ConsensusError::AlreadyFinalized);
            }

            let pending = self.get_pending_validators()?;
            self.storage.set_address_array(VALIDATORS, pending.clone())?;
            self.storage.set_bool(FINALIZED, true)?;
            info!("Finalized validator set of {} validators", pending.len());
            self.store.emit(self.address, Event::ChangeFinalized { new_set: pending });
            Ok(())
        })
    }

    /// Points the coordinator at the key manager allowed to mutate the roster.
    pub fn init_key_manager(&self, call: &Call, key_manager: Address) -> Result<()> {
        self.store.atomically(|| {
            self.require(call, Role::MasterOfCeremony, self.master_of_ceremony()?)?;
            if key_manager.is_zero() {
                return Err(ConsensusError::InvalidAddress);
            }
            self.storage.set_address(KEY_MANAGER, key_manager)?;
            info!("Key manager set to {}", key_manager);
            Ok(())
        })
    }

    pub fn set_system_address(&self, call: &Call, system_address: Address) -> Result<()> {
        self.store.atomically(|| {
            self.require(call, Role::MasterOfCeremony, self.master_of_ceremony()?)?;
            if system_address.is_zero() {
                return Err(ConsensusError::InvalidAddress);
            }
            self.storage.set_address(SYSTEM_ADDRESS, system_address)?;
            info!("System address set to {}", system_address);
            Ok(())
        })
    }

    // Validator support

    /// Records the calling pending validator as a supporter of `validator`.
    pub fn support_validator(&self, call: &Call, validator: Address) -> Result<()> {
        self.store.atomically(|| {
            self.require_pending_validator(call)?;
            if !self.is_validator(&validator)? {
                return Err(ConsensusError::NotAValidator(validator));
            }
            let mut supporters = self.get_validator_supporters(&validator)?;
            if supporters.contains(&call.sender) {
                return Err(ConsensusError::AlreadySupported {
                    supporter: call.sender,
                    validator,
                });
            }
            supporters.push(call.sender);
            debug!("{} now supports {} ({} supporters)", call.sender, validator, supporters.len());
            self.storage
                .set_address_array_by_address(SUPPORTERS, &validator, supporters)?;
            Ok(())
        })
    }

    /// Withdraws the caller's support for `validator`.
    pub fn withdraw_support(&self, call: &Call, validator: Address) -> Result<()> {
        self.store.atomically(|| {
            self.require_pending_validator(call)?;
            let mut supporters = self.get_validator_supporters(&validator)?;
            let index = supporters
                .iter()
                .position(|supporter| supporter == &call.sender)
                .ok_or(ConsensusError::NotSupported {
                    supporter: call.sender,
                    validator,
                })?;
            supporters.remove(index);
            debug!("{} withdrew support for {}", call.sender, validator);
            self.storage
                .set_address_array_by_address(SUPPORTERS, &validator, supporters)?;
            Ok(())
        })
    }

    pub fn set_validator_support_divisor(&self, call: &Call, divisor: u64) -> Result<()> {
        self.store.atomically(|| {
            self.require(call, Role::MasterOfCeremony, self.master_of_ceremony()?)?;
            if divisor == 0 {
                return Err(ConsensusError::InvalidSupportDivisor);
            }
            self.storage.set_uint(SUPPORT_DIVISOR, divisor)?;
            info!("Validator support divisor set to {}", divisor);
            Ok(())
        })
    }

    pub fn get_validator_support_divisor(&self) -> Result<u64> {
        Ok(self.storage.get_uint(SUPPORT_DIVISOR)?)
    }

    pub fn get_validator_supporters(&self, validator: &Address) -> Result<Vec<Address>> {
        Ok(self.storage.get_address_array_by_address(SUPPORTERS, validator)?)
    }

    pub fn get_validator_support_count(&self, validator: &Address) -> Result<u64> {
        Ok(self.get_validator_supporters(validator)?.len() as u64)
    }

    /// Supporters a pending validator needs under the current divisor.
    pub fn get_required_support(&self) -> Result<u64> {
        let divisor = self.get_validator_support_divisor()?.max(1);
        Ok(self.get_pending_validators_count()? / divisor + 1)
    }

    pub fn has_enough_support(&self, validator: &Address) -> Result<bool> {
        if !self.is_validator(validator)? {
            return Ok(false);
        }
        Ok(self.get_validator_support_count(validator)? >= self.get_required_support()?)
    }

    /// Drops `validator` from the roster's support bookkeeping.
    fn forget_support(&self, validator: &Address, remaining: &[Address]) -> Result<()> {
        self.storage.delete_mapping(SUPPORTERS, validator)?;
        for member in remaining {
            let mut supporters = self.get_validator_supporters(member)?;
            let before = supporters.len();
            supporters.retain(|supporter| supporter != validator);
            if supporters.len() != before {
                self.storage
                    .set_address_array_by_address(SUPPORTERS, member, supporters)?;
            }
        }
        Ok(())
    }

    pub fn key_manager(&self) -> Result<Address> {
        Ok(self.storage.get_address(KEY_MANAGER)?)
    }

    pub fn system_address(&self) -> Result<Address> {
        Ok(self.storage.get_address(SYSTEM_ADDRESS)?)
    }

    pub fn is_finalized(&self) -> Result<bool> {
        Ok(self.storage.get_bool(FINALIZED)?)
    }

    pub fn get_validator_metadata(&self, validator: &Address) -> Result<ValidatorMetadata> {
        Ok(ValidatorMetadata {
            is_validator: self.storage.get_bool_by_address(METADATA_IS_VALIDATOR, validator)?,
            added_at: self.storage.get_uint_by_address(METADATA_ADDED_AT, validator)?,
            support_count: self.get_validator_support_count(validator)?,
        })
    }

    pub fn get_validators_count(&self) -> Result<u64> {
        Ok(self.storage.get_address_array_length(VALIDATORS)?)
    }

    pub fn get_pending_validators_count(&self) -> Result<u64> {
        Ok(self.storage.get_address_array_length(PENDING_VALIDATORS)?)
    }

    pub fn minimum_validator_count(&self) -> u64 {
        MAX_INITIAL_VALIDATORS
    }

    pub fn maximum_validator_count(&self) -> u64 {
        MAX_VALIDATOR_COUNT
    }
}

impl ValidatorSet for ValidatorSetCoordinator {
    fn add_validator(&self, call: &Call, validator: Address) -> Result<()> {
        self.store.atomically(|| {
            self.require_key_manager(call)?;
            if validator.is_zero() {
                return Err(ConsensusError::InvalidAddress);
            }

            let mut pending = self.get_pending_validators()?;
            if pending.contains(&validator) {
                return Err(ConsensusError::DuplicateValidator(validator));
            }
            if pending.len() as u64 >= MAX_VALIDATOR_COUNT {
                return Err(ConsensusError::CapacityExceeded {
                    limit: MAX_VALIDATOR_COUNT,
                });
            }

            pending.push(validator);
            self.storage.set_bool_by_address(METADATA_IS_VALIDATOR, &validator, true)?;
            self.storage.set_uint_by_address(METADATA_ADDED_AT, &validator, call.timestamp)?;
            self.storage
                .set_address_array_by_address(SUPPORTERS, &validator, vec![validator])?;
            info!("Added pending validator {} ({} pending)", validator, pending.len());
            self.initiate_change(pending)
        })
    }

    fn remove_validator(&self, call: &Call, validator: Address) -> Result<()> {
        self.store.atomically(|| {
            self.require_key_manager(call)?;

            let mut pending = self.get_pending_validators()?;
            let index = pending
                .iter()
                .position(|candidate| candidate == &validator)
                .ok_or(ConsensusError::NotAValidator(validator))?;

            pending.remove(index);
            self.storage.delete_mapping(METADATA_IS_VALIDATOR, &validator)?;
            self.storage.delete_mapping(METADATA_ADDED_AT, &validator)?;
            self.forget_support(&validator, &pending)?;
            info!("Removed pending validator {} ({} pending)", validator, pending.len());
            self.initiate_change(pending)
        })
    }

    fn is_validator(&self, validator: &Address) -> Result<bool> {
        Ok(self.storage.get_bool_by_address(METADATA_IS_VALIDATOR, validator)?)
    }

    fn get_validators(&self) -> Result<Vec<Address>> {
        Ok(self.storage.get_address_array(VALIDATORS)?)
    }

    fn get_pending_validators(&self) -> Result<Vec<Address>> {
        Ok(self.storage.get_address_array(PENDING_VALIDATORS)?)
    }

    fn master_of_ceremony(&self) -> Result<Address> {
        Ok(self.storage.get_address(MASTER_OF_CEREMONY)?)
    }
}
