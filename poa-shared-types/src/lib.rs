//! Types shared by every crate of the PoA key lifecycle workspace.
//!
//! The storage facade, the validator-set coordinator and the key lifecycle
//! manager all speak in terms of the [`Address`] defined here, tag their
//! notifications with [`events::Event`], and classify their failures with
//! [`ErrorKind`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod events;
pub mod validator;

pub use events::{Event, EventLog, EventRecord, EventSink};
pub use validator::{InitialKeyState, KeyAction, KeyTriad, MigratedKind, ValidatorKeys};

/// Maximum number of initial keys the ceremony master may create.
pub const MAX_INITIAL_VALIDATORS: u64 = 12;

/// Default ceiling on concurrently mining-active validators.
pub const DEFAULT_MAX_TOTAL_VALIDATORS: u64 = 200;

/// Hard ceiling on the coordinator's pending roster.
pub const MAX_VALIDATOR_COUNT: u64 = 1024;

/// Default divisor of the pending roster size used to derive the support a
/// validator needs: `pending / divisor + 1`.
pub const DEFAULT_VALIDATOR_SUPPORT_DIVISOR: u64 = 2;

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// A 20-byte account identifier. The all-zero address is the "unset" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// The privileged caller the consensus client uses to finalize validator changes.
    pub const SYSTEM: Address = Address([
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xfe,
    ]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    /// Builds an address whose low eight bytes hold `value` big-endian.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[ADDRESS_LEN - 8..].copy_from_slice(&value.to_be_bytes());
        Address(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),
    #[error("Address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = bytes.as_slice().try_into().map_err(|_| {
            AddressParseError::InvalidLength {
                expected: ADDRESS_LEN,
                actual: bytes.len(),
            }
        })?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; ADDRESS_LEN]>::deserialize(deserializer).map(Address)
        }
    }
}

/// The caller context of a state-mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// The address the operation is executed on behalf of.
    pub sender: Address,
    /// Unix timestamp (seconds) the operation is executed at.
    pub timestamp: u64,
}

impl Call {
    pub fn new(sender: Address) -> Self {
        Call { sender, timestamp: 0 }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The same call re-issued by another component, as when one component calls into another.
    pub fn forwarded_by(&self, sender: Address) -> Self {
        Call { sender, timestamp: self.timestamp }
    }
}

/// Authorization roles checked before any privileged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    MasterOfCeremony,
    VotingGateway,
    KeyManager,
    System,
    InitialKey,
    /// Any member of the pending validator set.
    Validator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::MasterOfCeremony => "master of ceremony",
            Role::VotingGateway => "voting gateway",
            Role::KeyManager => "key manager",
            Role::System => "system",
            Role::InitialKey => "initial key",
            Role::Validator => "pending validator",
        };
        f.write_str(name)
    }
}

/// Coarse classification of every rejection the workspace can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller does not hold the required role.
    Authorization,
    /// A zero address or colliding keys were supplied.
    Validation,
    /// The target is already in, or not yet in, the required state.
    StateConflict,
    /// A ceremony or roster cap would be exceeded.
    Capacity,
    /// The key is not eligible for migration from the predecessor.
    Migration,
    /// The storage backend failed.
    Storage,
}
