//! Audit trail of key lifecycle decisions.

use tracing::{event, Level};

use poa_shared_types::{Address, Event};

use crate::error::KeyError;

/// Logs when a key manager is deployed or re-attached to existing state.
#[tracing::instrument(level = "info", skip(previous))]
pub fn log_manager_deployed(manager: Address, master_of_ceremony: Address, previous: Option<Address>) {
    match previous {
        Some(previous) => event!(
            Level::INFO,
            "Key manager {} deployed, migrating from {}",
            manager,
            previous
        ),
        None => event!(Level::INFO, "Key manager {} deployed", manager),
    }
}

/// Logs a committed key lifecycle change.
#[tracing::instrument(level = "info", skip(event))]
pub fn log_key_event(manager: Address, event: &Event) {
    match event {
        Event::InitialKeyCreated {
            initial_key,
            initial_keys_count,
            ..
        } => event!(
            Level::INFO,
            "Initial key {} created ({} total)",
            initial_key,
            initial_keys_count
        ),
        Event::ValidatorInitialized {
            mining_key,
            payout_key,
            voting_key,
        } => event!(
            Level::INFO,
            "Validator initialized: mining={}, payout={}, voting={}",
            mining_key,
            payout_key,
            voting_key
        ),
        Event::MiningKeyChanged { key, action } => {
            event!(Level::INFO, "Mining key {} {}", key, action)
        }
        Event::VotingKeyChanged {
            key,
            mining_key,
            action,
        } => event!(Level::INFO, "Voting key {} {} for {}", key, action, mining_key),
        Event::PayoutKeyChanged {
            key,
            mining_key,
            action,
        } => event!(Level::INFO, "Payout key {} {} for {}", key, action, mining_key),
        Event::Migrated { key, name } => event!(Level::INFO, "Migrated {:?} {}", name, key),
        other => event!(Level::DEBUG, "{} emitted by key manager", other.name()),
    }
}

/// Logs a rejected key lifecycle operation.
#[tracing::instrument(level = "warn", skip(error))]
pub fn log_rejection(manager: Address, operation: &str, caller: Address, error: &KeyError) {
    event!(
        Level::WARN,
        "Rejected {} from {} ({:?}): {}",
        operation,
        caller,
        error.kind(),
        error
    );
}
