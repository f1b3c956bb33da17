use poa_node::{
    Deployment, Envelope, Node, NodeConfig, NodeError, Request, Response, StorageBackend, StorageConfig,
};
use poa_shared_types::{Address, ErrorKind, Event, EventRecord, InitialKeyState, KeyAction, MigratedKind};
use serde_json::json;

const KEY_MANAGER: u64 = 0x4b;
const SUCCESSOR: u64 = 0x4c;

fn acct(i: u64) -> Address {
    Address::from_low_u64(0x100 + i)
}

fn master_of_ceremony() -> Address {
    acct(0)
}

fn memory_config() -> NodeConfig {
    NodeConfig {
        master_of_ceremony: master_of_ceremony(),
        voting_gateway: acct(99),
        ..Default::default()
    }
}

fn sled_config(path: &std::path::Path) -> NodeConfig {
    NodeConfig {
        storage: StorageConfig {
            backend: StorageBackend::Sled,
            path: Some(path.to_path_buf()),
        },
        ..memory_config()
    }
}

fn node() -> Node {
    Node::open(&memory_config()).unwrap()
}

async fn send(node: &Node, from: Address, request: Request) -> Response {
    node.handle(Envelope::new(from, request)).await
}

fn events(response: Response) -> Vec<EventRecord> {
    match response {
        Response::Ok { events, .. } => events,
        Response::Error { kind, message } => panic!("request failed ({:?}): {}", kind, message),
    }
}

fn result(response: Response) -> serde_json::Value {
    match response {
        Response::Ok { result: Some(result), .. } => result,
        other => panic!("expected a query result, got {:?}", other),
    }
}

fn error_kind(response: Response) -> ErrorKind {
    match response {
        Response::Error { kind, .. } => kind,
        other => panic!("expected an error, got {:?}", other),
    }
}

async fn register(node: &Node, initial: u64, mining: u64, payout: u64, voting: u64) {
    events(send(node, master_of_ceremony(), Request::InitiateKeys { key: acct(initial) }).await);
    events(
        send(
            node,
            acct(initial),
            Request::CreateKeys {
                mining_key: acct(mining),
                payout_key: acct(payout),
                voting_key: acct(voting),
            },
        )
        .await,
    );
}

#[tokio::test]
async fn test_ceremony_reports_events_in_order() {
    let node = node();
    let initiated = events(
        node.handle(Envelope {
            from: master_of_ceremony(),
            timestamp: 1_700,
            request: Request::InitiateKeys { key: acct(1) },
        })
        .await,
    );
    assert_eq!(
        initiated,
        vec![EventRecord {
            emitter: Address::from_low_u64(KEY_MANAGER),
            event: Event::InitialKeyCreated {
                initial_key: acct(1),
                time: 1_700,
                initial_keys_count: 1,
            },
        }]
    );

    let created = events(
        send(
            &node,
            acct(1),
            Request::CreateKeys {
                mining_key: acct(2),
                payout_key: acct(3),
                voting_key: acct(4),
            },
        )
        .await,
    );
    let names: Vec<_> = created.iter().map(|record| record.event.name()).collect();
    assert_eq!(names, vec!["InitiateChange", "ValidatorInitialized"]);
    assert_eq!(
        created[0].event,
        Event::InitiateChange {
            new_set: vec![master_of_ceremony(), acct(2)],
        }
    );
}

#[tokio::test]
async fn test_rejected_request_reports_kind_and_no_events() {
    let node = node();
    let response = send(&node, acct(5), Request::InitiateKeys { key: acct(1) }).await;
    assert_eq!(error_kind(response), ErrorKind::Authorization);

    let response = send(&node, acct(99), Request::AddMiningKey { key: Address::ZERO }).await;
    assert_eq!(error_kind(response), ErrorKind::Validation);

    // The next successful request carries only its own events.
    let added = events(send(&node, acct(99), Request::AddMiningKey { key: acct(7) }).await);
    let names: Vec<_> = added.iter().map(|record| record.event.name()).collect();
    assert_eq!(names, vec!["InitiateChange", "MiningKeyChanged"]);
}

#[tokio::test]
async fn test_queries_return_json_results() {
    let node = node();
    register(&node, 1, 2, 3, 4).await;

    let keys = result(send(&node, acct(9), Request::GetValidatorKeys { mining_key: acct(2) }).await);
    assert_eq!(keys["payout_key"], json!(acct(3).to_string()));
    assert_eq!(keys["is_voting_active"], json!(true));

    let mining = result(send(&node, acct(9), Request::GetMiningKeyByVoting { voting_key: acct(4) }).await);
    assert_eq!(mining, json!(acct(2).to_string()));

    let active = result(send(&node, acct(9), Request::IsVotingActive { voting_key: acct(4) }).await);
    assert_eq!(active, json!(true));

    let initial = result(send(&node, acct(9), Request::GetInitialKey { key: acct(1) }).await);
    let initial: InitialKeyState = serde_json::from_value(initial).unwrap();
    assert_eq!(initial, InitialKeyState::NonExistent);

    let pending = result(send(&node, acct(9), Request::GetPendingValidators).await);
    assert_eq!(pending, json!([master_of_ceremony().to_string(), acct(2).to_string()]));
}

#[tokio::test]
async fn test_finalize_change_through_dispatcher() {
    let node = node();
    events(send(&node, acct(99), Request::AddMiningKey { key: acct(7) }).await);

    let response = send(&node, acct(99), Request::FinalizeChange).await;
    assert_eq!(error_kind(response), ErrorKind::Authorization);

    let finalized = events(send(&node, Address::SYSTEM, Request::FinalizeChange).await);
    assert_eq!(
        finalized[0].event,
        Event::ChangeFinalized {
            new_set: vec![master_of_ceremony(), acct(7)],
        }
    );

    let status = node.status().await.unwrap();
    assert!(status.finalized);
    assert_eq!(status.validators, vec![master_of_ceremony(), acct(7)]);
    assert_eq!(status.validator_count, 2);
    assert_eq!(status.max_initial_validators, 12);

    let response = send(&node, Address::SYSTEM, Request::FinalizeChange).await;
    assert_eq!(error_kind(response), ErrorKind::StateConflict);
}

#[tokio::test]
async fn test_redeploy_key_manager_and_migrate() {
    let node = node();
    register(&node, 1, 2, 3, 4).await;
    events(send(&node, master_of_ceremony(), Request::InitiateKeys { key: acct(5) }).await);

    let successor = Address::from_low_u64(SUCCESSOR);
    events(send(&node, master_of_ceremony(), Request::RedeployKeyManager { address: successor }).await);

    let status = node.status().await.unwrap();
    assert_eq!(status.key_manager, successor);
    assert_eq!(status.retired_key_managers, vec![Address::from_low_u64(KEY_MANAGER)]);
    assert_eq!(status.voting_gateway, acct(99));
    assert_eq!(status.validator_count, 1);

    let migrated = events(send(&node, acct(42), Request::MigrateMiningKey { key: acct(2) }).await);
    assert_eq!(
        migrated,
        vec![EventRecord {
            emitter: successor,
            event: Event::Migrated {
                key: acct(2),
                name: MigratedKind::MiningKey,
            },
        }]
    );
    events(send(&node, acct(42), Request::MigrateInitialKey { key: acct(5) }).await);

    // The migrated initial key registers against the new manager.
    events(
        send(
            &node,
            acct(5),
            Request::CreateKeys {
                mining_key: acct(10),
                payout_key: acct(11),
                voting_key: acct(12),
            },
        )
        .await,
    );
    let status = node.status().await.unwrap();
    assert_eq!(status.validator_count, 3);
    assert_eq!(
        status.pending_validators,
        vec![master_of_ceremony(), acct(2), acct(10)]
    );

    // Voting-key management on the migrated validator goes through the new manager.
    let swapped = events(
        send(
            &node,
            acct(99),
            Request::SwapVotingKey {
                key: acct(20),
                mining_key: acct(2),
            },
        )
        .await,
    );
    assert_eq!(
        swapped.into_iter().map(|record| record.event).collect::<Vec<_>>(),
        vec![
            Event::VotingKeyChanged {
                key: acct(4),
                mining_key: acct(2),
                action: KeyAction::Removed,
            },
            Event::VotingKeyChanged {
                key: acct(20),
                mining_key: acct(2),
                action: KeyAction::Added,
            },
        ]
    );
}

#[tokio::test]
async fn test_redeploy_key_manager_rejections() {
    let node = node();
    let successor = Address::from_low_u64(SUCCESSOR);

    let response = send(&node, acct(99), Request::RedeployKeyManager { address: successor }).await;
    assert_eq!(error_kind(response), ErrorKind::Authorization);

    let response = send(&node, master_of_ceremony(), Request::RedeployKeyManager { address: Address::ZERO }).await;
    assert_eq!(error_kind(response), ErrorKind::Validation);

    let response = send(
        &node,
        master_of_ceremony(),
        Request::RedeployKeyManager {
            address: Address::from_low_u64(KEY_MANAGER),
        },
    )
    .await;
    assert_eq!(error_kind(response), ErrorKind::Validation);

    assert_eq!(node.status().await.unwrap().key_manager, Address::from_low_u64(KEY_MANAGER));
}

#[tokio::test]
async fn test_old_manager_loses_authority_after_redeploy() {
    let config = memory_config();
    let mut deployment = Deployment::open(&config).unwrap();
    let call = poa_shared_types::Call::new(master_of_ceremony());
    deployment
        .redeploy_key_manager(&call, Address::from_low_u64(SUCCESSOR))
        .unwrap();

    let retired = deployment.retired()[0].clone();
    let err = retired
        .add_mining_key(&poa_shared_types::Call::new(acct(99)), acct(7))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(!retired.is_mining_active(&acct(7)).unwrap());

    let err = deployment
        .redeploy_key_manager(&call, Address::from_low_u64(KEY_MANAGER))
        .unwrap_err();
    assert!(matches!(err, NodeError::AddressInUse(_)));
}

#[tokio::test]
async fn test_malformed_lines_are_rejected() {
    let node = node();
    let response = node.handle_line("{\"op\": \"initiate_keys\"}").await;
    assert_eq!(error_kind(response), ErrorKind::Validation);
    let response = node.handle_line("not json").await;
    assert_eq!(error_kind(response), ErrorKind::Validation);
}

#[tokio::test]
async fn test_serve_answers_each_line() {
    let node = node();
    let moc = master_of_ceremony();
    let input = format!(
        "{}\n\n# comment\n{}\n{}\n",
        json!({"from": moc.to_string(), "op": "initiate_keys", "key": acct(1).to_string()}),
        json!({"from": acct(5).to_string(), "op": "initiate_keys", "key": acct(2).to_string()}),
        json!({"from": acct(5).to_string(), "op": "get_initial_key", "key": acct(1).to_string()}),
    );
    let mut output = Vec::new();

    let summary = node.serve(input.as_bytes(), &mut output).await.unwrap();
    assert_eq!(summary.handled, 3);
    assert_eq!(summary.rejected, 1);

    let responses: Vec<Response> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(responses.len(), 3);
    assert!(responses[0].is_ok());
    assert_eq!(error_kind(responses[1].clone()), ErrorKind::Authorization);
    assert_eq!(result(responses[2].clone()), json!("Activated"));
}

#[tokio::test]
async fn test_sled_deployment_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = sled_config(dir.path());
    let successor = Address::from_low_u64(SUCCESSOR);

    {
        let node = Node::open(&config).unwrap();
        register(&node, 1, 2, 3, 4).await;
        events(send(&node, master_of_ceremony(), Request::RedeployKeyManager { address: successor }).await);
        node.flush().await.unwrap();
    }

    let node = Node::open(&config).unwrap();
    let status = node.status().await.unwrap();
    assert_eq!(status.key_manager, successor);
    assert_eq!(status.retired_key_managers, vec![Address::from_low_u64(KEY_MANAGER)]);
    assert_eq!(status.pending_validators, vec![master_of_ceremony(), acct(2)]);

    // The predecessor is reattached, so migration still works.
    events(send(&node, acct(42), Request::MigrateMiningKey { key: acct(2) }).await);
    let clone = result(send(&node, acct(42), Request::HasValidatorClone { mining_key: acct(2) }).await);
    assert_eq!(clone, json!(true));
}

#[tokio::test]
async fn test_sled_backend_requires_path() {
    let config = NodeConfig {
        storage: StorageConfig {
            backend: StorageBackend::Sled,
            path: None,
        },
        ..memory_config()
    };
    assert!(matches!(Node::open(&config), Err(NodeError::MissingStoragePath)));
}

#[tokio::test]
async fn test_validator_support_through_dispatcher() {
    let node = node();
    let divisor = result(send(&node, acct(9), Request::GetValidatorSupportDivisor).await);
    assert_eq!(divisor, json!(2));
    let count = result(
        send(&node, acct(9), Request::GetValidatorSupportCount { validator: master_of_ceremony() }).await,
    );
    assert_eq!(count, json!(1));

    events(send(&node, acct(99), Request::AddMiningKey { key: acct(7) }).await);
    let supported = events(send(&node, master_of_ceremony(), Request::SupportValidator { validator: acct(7) }).await);
    assert!(supported.is_empty());
    let enough = result(send(&node, acct(9), Request::HasEnoughSupport { validator: acct(7) }).await);
    assert_eq!(enough, json!(true));

    let response = send(&node, acct(9), Request::SupportValidator { validator: acct(7) }).await;
    assert_eq!(error_kind(response), ErrorKind::Authorization);
    let response = send(&node, master_of_ceremony(), Request::SetValidatorSupportDivisor { divisor: 0 }).await;
    assert_eq!(error_kind(response), ErrorKind::Validation);
}

#[tokio::test]
async fn test_query_responses_carry_no_events() {
    let node = node();
    let response = send(&node, acct(9), Request::GetPendingValidators).await;
    assert!(matches!(response, Response::Ok { ref events, .. } if events.is_empty()));

    // The next mutation still reports exactly its own events.
    let added = events(send(&node, acct(99), Request::AddMiningKey { key: acct(7) }).await);
    assert_eq!(added.len(), 2);
}
