//! Notifications emitted by the key lifecycle manager and the validator-set coordinator.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use crate::validator::{KeyAction, MigratedKind};
use crate::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum Event {
    InitialKeyCreated {
        initial_key: Address,
        time: u64,
        initial_keys_count: u64,
    },
    ValidatorInitialized {
        mining_key: Address,
        payout_key: Address,
        voting_key: Address,
    },
    MiningKeyChanged {
        key: Address,
        action: KeyAction,
    },
    VotingKeyChanged {
        key: Address,
        mining_key: Address,
        action: KeyAction,
    },
    PayoutKeyChanged {
        key: Address,
        mining_key: Address,
        action: KeyAction,
    },
    Migrated {
        key: Address,
        name: MigratedKind,
    },
    /// A new pending validator set the sealing engine should begin rotating to.
    InitiateChange {
        new_set: Vec<Address>,
    },
    /// The pending set has been committed as the active validator set.
    ChangeFinalized {
        new_set: Vec<Address>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::InitialKeyCreated { .. } => "InitialKeyCreated",
            Event::ValidatorInitialized { .. } => "ValidatorInitialized",
            Event::MiningKeyChanged { .. } => "MiningKeyChanged",
            Event::VotingKeyChanged { .. } => "VotingKeyChanged",
            Event::PayoutKeyChanged { .. } => "PayoutKeyChanged",
            Event::Migrated { .. } => "Migrated",
            Event::InitiateChange { .. } => "InitiateChange",
            Event::ChangeFinalized { .. } => "ChangeFinalized",
        }
    }
}

/// An event together with the address of the component that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub emitter: Address,
    #[serde(flatten)]
    pub event: Event,
}

/// Receiver of emitted events. Implementations must preserve emission order.
pub trait EventSink: Send + Sync {
    fn emit(&self, emitter: Address, event: Event);
}

/// Append-only in-memory event log.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<EventRecord>> {
        // A panic while appending cannot leave a half-written record behind.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All records emitted so far, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.guard().clone()
    }

    /// Records emitted by a single component, oldest first.
    pub fn events_from(&self, emitter: &Address) -> Vec<Event> {
        self.guard()
            .iter()
            .filter(|record| &record.emitter == emitter)
            .map(|record| record.event.clone())
            .collect()
    }

    /// Removes and returns every record emitted so far.
    pub fn drain(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.guard())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, emitter: Address, event: Event) {
        self.guard().push(EventRecord { emitter, event });
    }
}
