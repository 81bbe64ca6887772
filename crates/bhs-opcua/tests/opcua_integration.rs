// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA Integration Tests
//!
//! End-to-end behaviour of the client against the in-memory simulated
//! server. Reconnect tests run on a paused clock so the configured delays
//! elapse instantly.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bhs-opcua --test opcua_integration
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bhs_opcua::client::{
    ConnectionEvent, ConnectionState, DataChangeNotification, MonitoredItem, OpcUaClient,
    OpcUaValue, ReconnectPolicy,
};
use bhs_opcua::simulation::SimulatedServer;
use bhs_opcua::{
    AccessLevel, AttributeId, NodeId, OpcUaConfig, OpcUaError, OperationError, StatusCode,
};

// =============================================================================
// Helpers
// =============================================================================

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

fn var_x() -> NodeId {
    NodeId::string(2, "FolderA.VarX")
}

fn var_y() -> NodeId {
    NodeId::string(2, "FolderA.VarY")
}

/// Routes client logs to the test output; set `RUST_LOG` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client_for(server: &SimulatedServer) -> OpcUaClient {
    init_tracing();
    let config = OpcUaConfig::builder()
        .endpoint(server.endpoint_url())
        .reconnect(ReconnectPolicy::fixed(RECONNECT_DELAY))
        .build()
        .unwrap();
    OpcUaClient::new(config, server.transport())
}

async fn connected(server: &SimulatedServer) -> OpcUaClient {
    let client = client_for(server);
    client.connect().await.expect("Failed to connect");
    client
}

/// Records every notification as `(key, node, value)`.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<(String, NodeId, OpcUaValue)>>>,
}

impl Recorder {
    fn callback(&self) -> impl Fn(&str, &MonitoredItem, &DataChangeNotification) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |key: &str, item: &MonitoredItem, change: &DataChangeNotification| {
            seen.lock()
                .unwrap()
                .push((key.to_string(), item.node_id.clone(), change.value.value.clone()));
        }
    }

    fn snapshot(&self) -> Vec<(String, NodeId, OpcUaValue)> {
        self.seen.lock().unwrap().clone()
    }
}

/// Lets spawned dispatcher tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Session Lifecycle
// =============================================================================

#[tokio::test]
async fn test_connect_then_disconnect_leaves_no_reconnect() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    client.disconnect().await.unwrap();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.session().is_reconnecting());
    assert_eq!(server.close_count(), 1);
}

#[tokio::test]
async fn test_connected_event_fires_once_per_connection() {
    let server = SimulatedServer::demo();
    let client = client_for(&server);
    let mut events = client.events();

    client.connect().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), ConnectionEvent::Connected { .. }));

    client.disconnect().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_initial_connect_failure_is_surfaced() {
    let server = SimulatedServer::demo();
    server.set_fail_open(true);
    let client = client_for(&server);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, OpcUaError::Connection(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_failure_reconnects_within_delay() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;
    let first = client.session().session_id().unwrap();

    server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    tokio::time::sleep(RECONNECT_DELAY - Duration::from_millis(100)).await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert_eq!(server.reconnect_count(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.reconnect_count(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_ne!(client.session().session_id().unwrap(), first);
}

#[tokio::test(start_paused = true)]
async fn test_second_keep_alive_failure_does_not_overlap() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    tokio::time::sleep(Duration::from_secs(1)).await;
    server.fail_keep_alive(StatusCode::BAD_TIMEOUT);
    tokio::time::sleep(RECONNECT_DELAY * 2).await;

    assert_eq!(server.reconnect_count(), 1);
    assert_eq!(client.session().stats().keep_alive_failures(), 2);
    assert_eq!(client.session().stats().reconnects(), 1);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_retries_until_success() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;
    let mut events = client.events();

    server.set_reconnect_failures(3);
    server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);

    let mut reconnecting = 0;
    loop {
        match events.recv().await.unwrap() {
            ConnectionEvent::Reconnecting { .. } => reconnecting += 1,
            ConnectionEvent::Reconnected { attempts, .. } => {
                assert_eq!(attempts, 4);
                break;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(reconnecting, 4);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(client.session().is_reconnecting());

    client.disconnect().await.unwrap();
    tokio::time::sleep(RECONNECT_DELAY * 3).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.reconnect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_operations_fail_fast_while_reconnecting() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let err = client.values().read_value(&var_x()).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Connection(_)));

    tokio::time::sleep(RECONNECT_DELAY).await;
    let value = client.values().read_value(&var_x()).await.unwrap();
    assert_eq!(value.value, OpcUaValue::Int32(42));
}

// =============================================================================
// Browsing
// =============================================================================

#[tokio::test]
async fn test_demo_hierarchy() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    let top = client.browser().browse_children(&NodeId::OBJECTS_FOLDER).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].display_name, "FolderA");

    let folder = top[0].node_id.to_local().unwrap().clone();
    let children = client.browser().browse_children(&folder).await.unwrap();
    let names: Vec<&str> = children.iter().map(|c| c.display_name.as_str()).collect();
    assert_eq!(names, vec!["VarX", "VarY"]);
}

#[tokio::test]
async fn test_paged_browse_matches_unpaged() {
    let server = SimulatedServer::plant();
    let line = NodeId::string(2, "Plant.Line1");
    let client = connected(&server).await;

    let unpaged = client.browser().browse_children(&line).await.unwrap();
    assert_eq!(unpaged.len(), 8);

    server.set_page_size(3);
    let paged = client.browser().browse_children(&line).await.unwrap();

    assert_eq!(paged, unpaged);
    assert_eq!(server.browse_next_count(), 2);
    assert_eq!(server.invalid_continuation_count(), 0);
    assert_eq!(server.outstanding_continuation_points(), 0);
}

#[tokio::test]
async fn test_browse_transport_failure_is_distinct_from_empty() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    let empty = client.browser().browse_children(&var_x()).await.unwrap();
    assert!(empty.is_empty());

    server.set_fail_browse(true);
    let err = client.browser().browse_children(&var_x()).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Browse(_)));
}

#[tokio::test]
async fn test_expandable_check_and_tree() {
    let server = SimulatedServer::plant();
    let client = connected(&server).await;

    let top = client.browser().browse_children(&NodeId::OBJECTS_FOLDER).await.unwrap();
    assert!(client.browser().is_expandable(&top[0]).await.unwrap());

    let tree = client.browser().browse_tree(&NodeId::OBJECTS_FOLDER, Some(3)).await.unwrap();
    // Plant, 2 lines, 8 variables each
    assert_eq!(tree.len(), 1 + 2 + 16);
    assert_eq!(tree[0].depth, 1);
    assert_eq!(tree[1].reference.display_name, "Line1");
    assert_eq!(tree[2].depth, 3);
}

// =============================================================================
// Value Access
// =============================================================================

#[tokio::test]
async fn test_read_write_scenario() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    assert_eq!(client.values().read_value(&var_x()).await.unwrap().value, OpcUaValue::Int32(42));
    client.values().write_value(&var_x(), OpcUaValue::Int32(100)).await.unwrap();
    assert_eq!(client.values().read_value(&var_x()).await.unwrap().value, OpcUaValue::Int32(100));
}

#[tokio::test]
async fn test_batch_read_is_positional() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;
    let missing = NodeId::string(2, "Missing");

    let values = client
        .values()
        .read_values(&[var_y(), missing, var_x()])
        .await
        .unwrap();

    assert_eq!(values[0].value, OpcUaValue::from("hi"));
    assert_eq!(values[1].status, StatusCode::BAD_NODE_ID_UNKNOWN);
    assert_eq!(values[2].value, OpcUaValue::Int32(42));
}

#[tokio::test]
async fn test_concurrent_reads_share_one_session() {
    let server = SimulatedServer::plant();
    let client = connected(&server).await;
    let nodes: Vec<NodeId> = ["Running", "Speed", "Setpoint", "Recipe"]
        .iter()
        .map(|name| NodeId::string(2, format!("Plant.Line1.{}", name)))
        .collect();

    let reads = nodes.iter().map(|node| client.values().read_value(node));
    let results = futures::future::join_all(reads).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(server.open_count(), 1);
    assert_eq!(server.read_count(), 4);
}

#[tokio::test]
async fn test_is_writable_scenarios() {
    let server = SimulatedServer::demo();
    let read_only = NodeId::string(2, "FolderA.ReadOnly");
    server.add_variable(
        &NodeId::string(2, "FolderA"),
        read_only.clone(),
        "ReadOnly",
        0i32,
        AccessLevel::CURRENT_READ,
    );
    server.set_attribute_status(&var_y(), AttributeId::AccessLevel, StatusCode::BAD_NOT_READABLE);
    let client = connected(&server).await;

    assert!(client.values().is_writable(&var_y()).await.unwrap());
    assert!(!client.values().is_writable(&read_only).await.unwrap());
    assert!(client.values().is_writable(&var_x()).await.unwrap());
}

#[tokio::test]
async fn test_write_bad_status_carries_code() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    let err = client
        .values()
        .write_value(&var_x(), OpcUaValue::Boolean(true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::WriteFailed { status, .. }) if status == StatusCode::BAD_TYPE_MISMATCH
    ));

    let failed = client
        .values()
        .write_value_async(&var_x(), OpcUaValue::Boolean(true))
        .await;
    assert_eq!(failed.unwrap_err().status_code(), Some(StatusCode::BAD_TYPE_MISMATCH));
}

#[tokio::test]
async fn test_batch_write_length_mismatch_is_rejected() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    let err = client
        .values()
        .write_values(&[var_x()], &[OpcUaValue::Int32(1), OpcUaValue::Int32(2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::BatchLengthMismatch { .. })
    ));
    assert_eq!(server.write_count(), 0);
    assert_eq!(server.value(&var_x()), Some(OpcUaValue::Int32(42)));
}

#[tokio::test]
async fn test_pending_write_cancel_and_timeout() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;

    let pending = client.values().write_value_async(&var_x(), OpcUaValue::Int32(5));
    pending.wait_timeout(Duration::from_secs(1)).await.unwrap();
    assert_eq!(server.value(&var_x()), Some(OpcUaValue::Int32(5)));

    let read = client.values().read_value_async(&var_y());
    assert_eq!(read.operation(), "Read");
    read.cancel();
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_subscription_scenario() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;
    let recorder = Recorder::default();

    client
        .subscriptions()
        .subscribe("grp1", &[var_x()], recorder.callback())
        .await
        .unwrap();

    server.set_value(&var_x(), 7i32);
    settle().await;
    assert_eq!(
        recorder.snapshot(),
        vec![("grp1".to_string(), var_x(), OpcUaValue::Int32(7))]
    );

    client.subscriptions().unsubscribe("grp1").await.unwrap();
    server.set_value(&var_x(), 8i32);
    settle().await;
    assert_eq!(recorder.snapshot().len(), 1);
}

#[tokio::test]
async fn test_resubscribe_same_key_keeps_only_second_set() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;
    let recorder = Recorder::default();

    client
        .subscriptions()
        .subscribe("grp1", &[var_x()], recorder.callback())
        .await
        .unwrap();
    client
        .subscriptions()
        .subscribe("grp1", &[var_y()], recorder.callback())
        .await
        .unwrap();

    assert_eq!(client.subscriptions().len().await, 1);
    let info = client.subscriptions().get("grp1").await.unwrap();
    let nodes: Vec<NodeId> = info.items.iter().map(|i| i.node_id.clone()).collect();
    assert_eq!(nodes, vec![var_y()]);

    server.set_value(&var_x(), 1i32);
    server.set_value(&var_y(), "changed");
    settle().await;
    assert_eq!(
        recorder.snapshot(),
        vec![("grp1".to_string(), var_y(), OpcUaValue::from("changed"))]
    );
}

#[tokio::test]
async fn test_concurrent_subscribes_for_different_keys() {
    let server = SimulatedServer::demo();
    let client = Arc::new(connected(&server).await);
    let count = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = Arc::clone(&client);
        let count = Arc::clone(&count);
        tasks.push(tokio::spawn(async move {
            let node = if i % 2 == 0 { var_x() } else { var_y() };
            client
                .subscriptions()
                .subscribe_one(&format!("key{}", i), &node, move |_: &str, _: &MonitoredItem, _: &DataChangeNotification| {
                    count.fetch_add(1, Ordering::Relaxed);
                })
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(client.subscriptions().len().await, 8);
    assert_eq!(server.subscription_count(), 8);

    server.set_value(&var_x(), 3i32);
    settle().await;
    assert_eq!(count.load(Ordering::Relaxed), 4);

    assert_eq!(client.subscriptions().unsubscribe_all().await.unwrap(), 8);
    assert_eq!(server.subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_subscription_survives_reconnect() {
    let server = SimulatedServer::demo();
    let client = connected(&server).await;
    let recorder = Recorder::default();

    client
        .subscriptions()
        .subscribe("grp1", &[var_x()], recorder.callback())
        .await
        .unwrap();

    server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    tokio::time::sleep(RECONNECT_DELAY * 2).await;
    assert!(client.is_connected());

    server.set_value(&var_x(), 9i32);
    settle().await;
    assert_eq!(recorder.snapshot().len(), 1);
}
