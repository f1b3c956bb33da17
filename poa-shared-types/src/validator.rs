//! Data structures describing validator identities and their operational keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Address;

/// Admission state of a bootstrap-admitted initial key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InitialKeyState {
    #[default]
    NonExistent = 0,
    Activated = 1,
}

impl InitialKeyState {
    pub fn as_u64(self) -> u64 {
        self as u64
    }

    /// Decodes a stored state. Unknown values read back as `NonExistent`.
    pub fn from_u64(value: u64) -> Self {
        match value {
            1 => InitialKeyState::Activated,
            _ => InitialKeyState::NonExistent,
        }
    }
}

/// The operational record kept for each mining key.
///
/// A zero address in `payout_key` or `voting_key` means the key is unset.
/// The all-default value is the wiped sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorKeys {
    pub payout_key: Address,
    pub voting_key: Address,
    pub is_mining_active: bool,
    pub is_payout_active: bool,
    pub is_voting_active: bool,
}

impl ValidatorKeys {
    /// A freshly added mining key with no linked payout or voting key.
    pub fn mining_only() -> Self {
        ValidatorKeys {
            is_mining_active: true,
            ..Default::default()
        }
    }

    /// A full triad as produced by the initial key ceremony.
    pub fn from_triad(triad: &KeyTriad) -> Self {
        ValidatorKeys {
            payout_key: triad.payout,
            voting_key: triad.voting,
            is_mining_active: true,
            is_payout_active: true,
            is_voting_active: true,
        }
    }

    pub fn is_wiped(&self) -> bool {
        *self == ValidatorKeys::default()
    }

    /// The payout key, if one is currently active.
    pub fn active_payout(&self) -> Option<Address> {
        (self.is_payout_active && !self.payout_key.is_zero()).then_some(self.payout_key)
    }

    /// The voting key, if one is currently active.
    pub fn active_voting(&self) -> Option<Address> {
        (self.is_voting_active && !self.voting_key.is_zero()).then_some(self.voting_key)
    }
}

/// The mining / payout / voting keys an initial key registers in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTriad {
    pub mining: Address,
    pub payout: Address,
    pub voting: Address,
}

impl KeyTriad {
    pub fn new(mining: Address, payout: Address, voting: Address) -> Self {
        KeyTriad { mining, payout, voting }
    }

    pub fn keys(&self) -> [Address; 3] {
        [self.mining, self.payout, self.voting]
    }

    /// Returns the first key that appears more than once in the triad.
    pub fn first_duplicate(&self) -> Option<Address> {
        if self.mining == self.payout || self.mining == self.voting {
            Some(self.mining)
        } else if self.payout == self.voting {
            Some(self.payout)
        } else {
            None
        }
    }
}

/// Action label carried by the key-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Added,
    Removed,
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::Added => f.write_str("added"),
            KeyAction::Removed => f.write_str("removed"),
        }
    }
}

/// Which kind of record a migration pulled forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigratedKind {
    #[serde(rename = "initialKey")]
    InitialKey,
    #[serde(rename = "miningKey")]
    MiningKey,
}

impl fmt::Display for MigratedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigratedKind::InitialKey => f.write_str("initialKey"),
            MigratedKind::MiningKey => f.write_str("miningKey"),
        }
    }
}
