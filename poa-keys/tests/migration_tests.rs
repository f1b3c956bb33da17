mod common;

use common::*;
use poa_consensus::ValidatorSet;
use poa_keys::{KeyError, KeyLedger};
use poa_shared_types::{Address, ErrorKind, Event, InitialKeyState, KeyTriad, MigratedKind};

fn successor_address() -> Address {
    Address::from_low_u64(0x4c)
}

fn migrated_events(net: &Network, manager: Address) -> Vec<Event> {
    net.events.events_from(&manager)
}

#[test]
fn test_migrate_initial_key_without_predecessor_is_rejected() {
    let net = Network::new();
    let err = net.manager.migrate_initial_key(&from(9), acct(2)).unwrap_err();
    assert!(matches!(err, KeyError::NotEligible(key) if key == acct(2)));
    assert_eq!(err.kind(), ErrorKind::Migration);
}

#[test]
fn test_migrate_initial_key() {
    let net = Network::new();
    net.manager.initiate_keys(&from(0), acct(2)).unwrap();
    let successor = net.successor(successor_address());

    successor.migrate_initial_key(&from(9), acct(2)).unwrap();

    assert_eq!(
        migrated_events(&net, successor.address()),
        vec![Event::Migrated {
            key: acct(2),
            name: MigratedKind::InitialKey,
        }]
    );
    assert_eq!(successor.get_previous_key_manager().unwrap(), net.manager.address());
    assert_eq!(successor.get_initial_key_count().unwrap(), 1);
    assert_eq!(successor.get_initial_key(&acct(1)).unwrap(), InitialKeyState::NonExistent);
    assert_eq!(successor.get_initial_key(&acct(2)).unwrap(), InitialKeyState::Activated);
}

#[test]
fn test_migrate_initial_key_twice_is_rejected() {
    let net = Network::new();
    net.manager.initiate_keys(&from(0), acct(2)).unwrap();
    let successor = net.successor(successor_address());
    successor.migrate_initial_key(&from(9), acct(2)).unwrap();

    let err = successor.migrate_initial_key(&from(9), acct(2)).unwrap_err();
    assert!(matches!(err, KeyError::NotEligible(_)));
    assert_eq!(successor.get_initial_key_count().unwrap(), 1);
}

#[test]
fn test_migrate_consumed_initial_key_is_rejected() {
    let net = Network::new();
    net.manager.initiate_keys(&from(0), acct(2)).unwrap();
    net.manager
        .create_keys(&from(2), KeyTriad::new(acct(3), acct(4), acct(5)))
        .unwrap();
    let successor = net.successor(successor_address());

    let err = successor.migrate_initial_key(&from(9), acct(2)).unwrap_err();
    assert!(matches!(err, KeyError::NotEligible(_)));
}

#[test]
fn test_migrated_initial_key_can_create_keys_on_successor() {
    let net = Network::new();
    net.manager.initiate_keys(&from(0), acct(2)).unwrap();
    let successor = net.successor(successor_address());
    successor.migrate_initial_key(&from(9), acct(2)).unwrap();
    net.consensus
        .init_key_manager(&from(0), successor.address())
        .unwrap();

    successor
        .create_keys(&from(2), KeyTriad::new(acct(3), acct(4), acct(5)))
        .unwrap();
    assert!(successor.is_mining_active(&acct(3)).unwrap());
    assert!(net.consensus.is_validator(&acct(3)).unwrap());
}

#[test]
fn test_master_of_ceremony_counts_as_cloned() {
    let net = Network::new();
    let successor = net.successor(successor_address());
    assert!(successor.has_validator_clone(&master_of_ceremony()).unwrap());
    let err = successor
        .migrate_mining_key(&from(9), master_of_ceremony())
        .unwrap_err();
    assert!(matches!(err, KeyError::AlreadyCloned(_)));
}

#[test]
fn test_migrate_mining_key_copies_triad() {
    let net = Network::new();
    let (mining, payout, voting) = (acct(2), acct(4), acct(3));
    net.manager.initiate_keys(&from(0), acct(1)).unwrap();
    net.manager
        .create_keys(&from(1), KeyTriad::new(mining, payout, voting))
        .unwrap();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    let successor = net.successor(successor_address());

    successor.migrate_mining_key(&from(9), mining).unwrap();

    assert_eq!(successor.get_validator_keys(&mining).unwrap(), record(payout, voting, true, true, true));
    assert!(successor.has_validator_clone(&mining).unwrap());
    assert_eq!(successor.get_mining_key_by_voting(&voting).unwrap(), mining);
    assert!(successor.is_mining_active(&mining).unwrap());
    assert!(successor.is_payout_active(&mining).unwrap());
    assert!(successor.is_voting_active(&voting).unwrap());
    assert_eq!(successor.get_validator_count().unwrap(), 2);

    successor.migrate_mining_key(&from(9), acct(5)).unwrap();
    assert_eq!(successor.get_validator_keys(&acct(5)).unwrap(), record(Address::ZERO, Address::ZERO, true, false, false));
    assert!(successor.has_validator_clone(&acct(5)).unwrap());

    let names: Vec<_> = migrated_events(&net, successor.address())
        .into_iter()
        .map(|event| match event {
            Event::Migrated { name, .. } => name,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(names, vec![MigratedKind::MiningKey, MigratedKind::MiningKey]);
}

#[test]
fn test_migrate_mining_key_does_not_touch_consensus() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    let pending = net.pending();
    let successor = net.successor(successor_address());
    net.events.drain();

    successor.migrate_mining_key(&from(9), acct(5)).unwrap();

    assert_eq!(net.pending(), pending);
    assert!(net.events.events_from(&net.consensus.address()).is_empty());
}

#[test]
fn test_migrate_mining_key_twice_is_rejected() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    let successor = net.successor(successor_address());
    successor.migrate_mining_key(&from(9), acct(5)).unwrap();

    let err = successor.migrate_mining_key(&from(9), acct(5)).unwrap_err();
    assert!(matches!(err, KeyError::AlreadyCloned(_)));
    assert_eq!(successor.get_validator_count().unwrap(), 2);
}

#[test]
fn test_migrate_inactive_mining_key_is_rejected() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    net.manager.remove_mining_key(&gateway(), acct(5)).unwrap();
    let successor = net.successor(successor_address());

    let err = successor.migrate_mining_key(&from(9), acct(5)).unwrap_err();
    assert!(matches!(err, KeyError::NotEligible(_)));
}

#[test]
fn test_migrate_mining_key_keeps_swap_history() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    net.manager.swap_mining_key(&gateway(), acct(6), acct(5)).unwrap();
    let successor = net.successor(successor_address());

    successor.migrate_mining_key(&from(9), acct(6)).unwrap();
    assert_eq!(successor.get_mining_key_history(&acct(6)).unwrap(), acct(5));
}

#[test]
fn test_migrate_mining_key_respects_capacity() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    let successor = net.successor(successor_address());
    successor.set_max_total_validators(&gateway(), 1).unwrap();

    let err = successor.migrate_mining_key(&from(9), acct(5)).unwrap_err();
    assert!(matches!(err, KeyError::CapacityExceeded { limit: 1 }));
    assert!(!successor.has_validator_clone(&acct(5)).unwrap());
}

#[test]
fn test_migrate_mining_key_rejects_colliding_linked_keys() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    net.manager.add_voting_key(&gateway(), acct(6), acct(5)).unwrap();
    let successor = net.successor(successor_address());

    // The successor is not yet the coordinator's key manager.
    let err = successor.add_mining_key(&gateway(), acct(7)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(!successor.is_mining_active(&acct(7)).unwrap());

    net.consensus
        .init_key_manager(&from(0), successor.address())
        .unwrap();
    successor.add_mining_key(&gateway(), acct(7)).unwrap();
    successor.add_voting_key(&gateway(), acct(6), acct(7)).unwrap();

    let err = successor.migrate_mining_key(&from(9), acct(5)).unwrap_err();
    assert!(matches!(err, KeyError::KeyCollision(key) if key == acct(6)));
}

#[test]
fn test_unmigrated_validator_cannot_be_linked_on_successor() {
    let net = Network::new();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();
    let successor = net.successor(successor_address());
    net.consensus
        .init_key_manager(&from(0), successor.address())
        .unwrap();
    successor.add_mining_key(&gateway(), acct(7)).unwrap();

    let err = successor.add_voting_key(&gateway(), acct(5), acct(7)).unwrap_err();
    assert!(matches!(err, KeyError::KeyCollision(key) if key == acct(5)));
    let err = successor.add_payout_key(&gateway(), acct(5), acct(7)).unwrap_err();
    assert!(matches!(err, KeyError::KeyCollision(key) if key == acct(5)));
    let err = successor.add_mining_key(&gateway(), acct(5)).unwrap_err();
    assert!(matches!(err, KeyError::DuplicateKey(key) if key == acct(5)));
    let err = successor.swap_mining_key(&gateway(), acct(5), acct(7)).unwrap_err();
    assert!(matches!(err, KeyError::DuplicateKey(key) if key == acct(5)));

    successor.migrate_mining_key(&from(9), acct(5)).unwrap();
    assert!(successor.is_mining_active(&acct(5)).unwrap());
    assert_eq!(successor.get_mining_key_by_voting(&acct(5)).unwrap(), Address::ZERO);
    assert_eq!(successor.get_mining_key_by_payout(&acct(5)).unwrap(), Address::ZERO);
}

#[test]
fn test_migrate_mining_key_already_linked_on_successor_is_rejected() {
    let net = Network::new();
    let successor = net.successor(successor_address());
    // Linked on the successor before the predecessor makes it a mining key.
    successor
        .add_voting_key(&gateway(), acct(5), master_of_ceremony())
        .unwrap();
    net.manager.add_mining_key(&gateway(), acct(5)).unwrap();

    let err = successor.migrate_mining_key(&from(9), acct(5)).unwrap_err();
    assert!(matches!(err, KeyError::KeyCollision(key) if key == acct(5)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!successor.is_mining_active(&acct(5)).unwrap());
    assert!(!successor.has_validator_clone(&acct(5)).unwrap());
    assert_eq!(
        successor.get_mining_key_by_voting(&acct(5)).unwrap(),
        master_of_ceremony()
    );
}
