// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA server.
//!
//! [`SimulatedServer`] implements both transport traits over an address space
//! held in memory. It pages browse results through continuation points, caps
//! the number of outstanding continuation points, pushes data changes to
//! subscriptions, and lets callers inject faults:
//!
//! - failed endpoint resolution, session open, and reconnect
//! - transport failures on browse, read, and write
//! - per-attribute read statuses
//! - bad keep-alive reports
//! - failed subscription deletes
//!
//! Subscriptions belong to the server rather than to a session, so they
//! survive a reconnect the way transferred subscriptions do.
//!
//! # Examples
//!
//! ```
//! use bhs_opcua::simulation::SimulatedServer;
//! use bhs_opcua::types::NodeId;
//!
//! let server = SimulatedServer::demo();
//! assert_eq!(
//!     server.value(&NodeId::string(2, "FolderA.VarX")).and_then(|v| v.as_i64()),
//!     Some(42)
//! );
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};

use crate::client::transport::{
    BrowseDescription, BrowseResult, ContinuationPoint, DataChangeNotification, DataValue,
    EndpointDescription, KeepAliveStatus, MonitoredItemRequest, MonitoredItemResult,
    OpcUaSession, OpcUaTransport, OpcUaValue, ReadValueId, ReferenceDescription,
    SubscriptionParameters, WriteValue, AGGREGATES, HIERARCHICAL_REFERENCES, ORGANIZES,
};
use crate::error::{ConnectionError, OpcUaError, OpcUaResult};
use crate::types::{
    AccessLevel, AttributeId, BrowseDirection, ExpandedNodeId, NodeClass, NodeId,
    QualifiedName, StatusCode, UserIdentity,
};

/// Default endpoint URL of a simulated server.
pub const DEFAULT_ENDPOINT: &str = "opc.tcp://simulated:4840";

const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);
const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);
const HAS_ORDERED_COMPONENT: NodeId = NodeId::numeric(0, 49);
const FOLDER_TYPE: NodeId = NodeId::numeric(0, 61);
const BASE_DATA_VARIABLE_TYPE: NodeId = NodeId::numeric(0, 63);

// =============================================================================
// Address space
// =============================================================================

#[derive(Debug, Clone)]
struct SimReference {
    reference_type: NodeId,
    target: ExpandedNodeId,
    /// Name and class for targets outside this server.
    remote: Option<(String, NodeClass)>,
}

#[derive(Debug, Clone)]
struct SimNode {
    browse_name: QualifiedName,
    display_name: String,
    description: String,
    node_class: NodeClass,
    type_definition: Option<NodeId>,
    value: Option<DataValue>,
    access_level: AccessLevel,
    references: Vec<SimReference>,
}

impl SimNode {
    fn object(node_id: &NodeId, name: &str) -> Self {
        Self {
            browse_name: QualifiedName::new(node_id.namespace_index, name),
            display_name: name.to_string(),
            description: String::new(),
            node_class: NodeClass::Object,
            type_definition: Some(FOLDER_TYPE),
            value: None,
            access_level: AccessLevel::NONE,
            references: Vec::new(),
        }
    }
}

fn is_subtype(filter: &NodeId, actual: &NodeId) -> bool {
    if *filter == AGGREGATES {
        [HAS_COMPONENT, HAS_PROPERTY, HAS_ORDERED_COMPONENT].contains(actual)
    } else if *filter == HIERARCHICAL_REFERENCES {
        [ORGANIZES, AGGREGATES, HAS_COMPONENT, HAS_PROPERTY, HAS_ORDERED_COMPONENT]
            .contains(actual)
    } else {
        false
    }
}

fn reference_matches(desc: &BrowseDescription, actual: &NodeId) -> bool {
    desc.reference_type_id.is_null()
        || desc.reference_type_id == *actual
        || (desc.include_subtypes && is_subtype(&desc.reference_type_id, actual))
}

// =============================================================================
// Server state
// =============================================================================

#[derive(Debug)]
struct SessionShared {
    id: String,
    endpoint: EndpointDescription,
    keep_alive: broadcast::Sender<KeepAliveStatus>,
    lost: AtomicBool,
    closed: AtomicBool,
}

#[derive(Debug)]
struct SimSubscription {
    sender: mpsc::UnboundedSender<DataChangeNotification>,
    /// (client handle, node) per monitored item.
    items: Vec<(u32, NodeId)>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_resolve: AtomicBool,
    fail_open: AtomicBool,
    fail_browse: AtomicBool,
    fail_browse_next: AtomicBool,
    fail_read: AtomicBool,
    fail_write: AtomicBool,
    fail_create_subscription: AtomicBool,
    fail_delete_subscription: AtomicBool,
    reconnect_failures: AtomicU32,
    open_delay: Mutex<Option<Duration>>,
    attribute_status: RwLock<HashMap<(NodeId, AttributeId), StatusCode>>,
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicU64,
    closes: AtomicU64,
    reconnects: AtomicU64,
    browse_requests: AtomicU64,
    browse_next_calls: AtomicU64,
    invalid_continuations: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    subscriptions_deleted: AtomicU64,
}

#[derive(Debug)]
struct ServerInner {
    endpoint_url: String,
    nodes: RwLock<HashMap<NodeId, SimNode>>,
    page_size: AtomicUsize,
    max_continuation_points: AtomicUsize,
    continuations: Mutex<HashMap<Vec<u8>, Vec<ReferenceDescription>>>,
    next_continuation: AtomicU64,
    sessions: Mutex<Vec<Arc<SessionShared>>>,
    next_session: AtomicU32,
    subscriptions: Mutex<HashMap<u32, SimSubscription>>,
    next_subscription: AtomicU32,
    next_monitored_item: AtomicU32,
    faults: Faults,
    counters: Counters,
}

// =============================================================================
// SimulatedServer
// =============================================================================

/// An in-memory OPC UA server.
///
/// Cloning is cheap; clones share the same server.
#[derive(Debug, Clone)]
pub struct SimulatedServer {
    inner: Arc<ServerInner>,
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedServer {
    /// Creates a server with an empty Root / Objects address space.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Creates an empty server answering on `endpoint_url`.
    pub fn with_endpoint(endpoint_url: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        let mut root = SimNode::object(&NodeId::ROOT_FOLDER, "Root");
        root.references.push(SimReference {
            reference_type: ORGANIZES,
            target: NodeId::OBJECTS_FOLDER.into(),
            remote: None,
        });
        nodes.insert(NodeId::ROOT_FOLDER, root);
        nodes.insert(
            NodeId::OBJECTS_FOLDER,
            SimNode::object(&NodeId::OBJECTS_FOLDER, "Objects"),
        );

        Self {
            inner: Arc::new(ServerInner {
                endpoint_url: endpoint_url.into(),
                nodes: RwLock::new(nodes),
                page_size: AtomicUsize::new(0),
                max_continuation_points: AtomicUsize::new(0),
                continuations: Mutex::new(HashMap::new()),
                next_continuation: AtomicU64::new(1),
                sessions: Mutex::new(Vec::new()),
                next_session: AtomicU32::new(1),
                subscriptions: Mutex::new(HashMap::new()),
                next_subscription: AtomicU32::new(1),
                next_monitored_item: AtomicU32::new(1),
                faults: Faults::default(),
                counters: Counters::default(),
            }),
        }
    }

    /// Creates a server exposing `Objects → FolderA → {VarX = 42, VarY = "hi"}`.
    ///
    /// `VarX` is `ns=2;s=FolderA.VarX` (Int32) and `VarY` is
    /// `ns=2;s=FolderA.VarY` (String); both are readable and writable.
    pub fn demo() -> Self {
        let server = Self::new();
        let folder = NodeId::string(2, "FolderA");
        server.add_folder(&NodeId::OBJECTS_FOLDER, folder.clone(), "FolderA");
        server.add_variable(
            &folder,
            NodeId::string(2, "FolderA.VarX"),
            "VarX",
            OpcUaValue::Int32(42),
            AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE,
        );
        server.add_variable(
            &folder,
            NodeId::string(2, "FolderA.VarY"),
            "VarY",
            OpcUaValue::from("hi"),
            AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE,
        );
        server
    }

    /// Creates a server with a small production-line model covering every
    /// value kind.
    pub fn plant() -> Self {
        Self::plant_at(DEFAULT_ENDPOINT)
    }

    /// Creates the [`plant`](Self::plant) model answering on `endpoint_url`.
    pub fn plant_at(endpoint_url: impl Into<String>) -> Self {
        let server = Self::with_endpoint(endpoint_url);
        let rw = AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE;
        let ro = AccessLevel::CURRENT_READ | AccessLevel::HISTORY_READ;

        let plant = NodeId::string(2, "Plant");
        server.add_folder(&NodeId::OBJECTS_FOLDER, plant.clone(), "Plant");

        for line in 1..=2u16 {
            let line_id = NodeId::string(2, format!("Plant.Line{}", line));
            server.add_folder(&plant, line_id.clone(), &format!("Line{}", line));

            let var = |name: &str| NodeId::string(2, format!("Plant.Line{}.{}", line, name));
            server.add_variable(&line_id, var("Running"), "Running", true, rw);
            server.add_variable(&line_id, var("Speed"), "Speed", 12.5f32, rw);
            server.add_variable(&line_id, var("Setpoint"), "Setpoint", 1500i32, rw);
            server.add_variable(&line_id, var("Count"), "Count", 0u32, ro);
            server.add_variable(&line_id, var("Temperature"), "Temperature", -12i16, ro);
            server.add_variable(&line_id, var("Mode"), "Mode", 2u16, rw);
            server.add_variable(&line_id, var("Recipe"), "Recipe", "default", rw);
            server.add_variable(&line_id, var("LastChange"), "LastChange", Utc::now(), ro);
        }

        server
    }

    /// Returns the endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.inner.endpoint_url
    }

    /// Returns a transport connected to this server.
    pub fn transport(&self) -> Arc<dyn OpcUaTransport> {
        Arc::new(SimulatedTransport {
            server: Arc::clone(&self.inner),
        })
    }

    // =========================================================================
    // Address space construction
    // =========================================================================

    /// Adds a folder organized by `parent`.
    pub fn add_folder(&self, parent: &NodeId, node_id: NodeId, name: &str) {
        let node = SimNode::object(&node_id, name);
        self.insert(parent, ORGANIZES, node_id, node);
    }

    /// Adds a variable as a component of `parent`.
    pub fn add_variable(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        name: &str,
        value: impl Into<OpcUaValue>,
        access_level: AccessLevel,
    ) {
        let node = SimNode {
            browse_name: QualifiedName::new(node_id.namespace_index, name),
            display_name: name.to_string(),
            description: format!("{} variable", name),
            node_class: NodeClass::Variable,
            type_definition: Some(BASE_DATA_VARIABLE_TYPE),
            value: Some(DataValue {
                source_timestamp: Some(Utc::now()),
                ..DataValue::good(value)
            }),
            access_level,
            references: Vec::new(),
        };
        self.insert(parent, HAS_COMPONENT, node_id, node);
    }

    /// Adds a reference from `parent` to a node on another server.
    pub fn add_remote_reference(
        &self,
        parent: &NodeId,
        target: ExpandedNodeId,
        name: &str,
        node_class: NodeClass,
    ) {
        if let Some(node) = self.inner.nodes.write().get_mut(parent) {
            node.references.push(SimReference {
                reference_type: ORGANIZES,
                target,
                remote: Some((name.to_string(), node_class)),
            });
        }
    }

    fn insert(&self, parent: &NodeId, reference_type: NodeId, node_id: NodeId, node: SimNode) {
        let mut nodes = self.inner.nodes.write();
        if let Some(parent) = nodes.get_mut(parent) {
            parent.references.push(SimReference {
                reference_type,
                target: node_id.clone().into(),
                remote: None,
            });
        }
        nodes.insert(node_id, node);
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Returns the current value of a variable.
    pub fn value(&self, node_id: &NodeId) -> Option<OpcUaValue> {
        self.inner
            .nodes
            .read()
            .get(node_id)
            .and_then(|n| n.value.as_ref())
            .map(|v| v.value.clone())
    }

    /// Changes a variable from the server side and notifies subscribers.
    pub fn set_value(&self, node_id: &NodeId, value: impl Into<OpcUaValue>) {
        self.inner.store_value(node_id, value.into());
    }

    // =========================================================================
    // Paging
    // =========================================================================

    /// Sets the maximum references per browse page (0 = unlimited).
    pub fn set_page_size(&self, page_size: usize) {
        self.inner.page_size.store(page_size, Ordering::Relaxed);
    }

    /// Caps outstanding continuation points (0 = unlimited).
    ///
    /// A browse needing a continuation point beyond the cap fails with
    /// `BadNoContinuationPoints`.
    pub fn set_max_continuation_points(&self, max: usize) {
        self.inner
            .max_continuation_points
            .store(max, Ordering::Relaxed);
    }

    /// Returns the number of continuation points not yet consumed.
    pub fn outstanding_continuation_points(&self) -> usize {
        self.inner.continuations.lock().len()
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Makes endpoint resolution fail.
    pub fn set_fail_resolve(&self, fail: bool) {
        self.inner.faults.fail_resolve.store(fail, Ordering::Relaxed);
    }

    /// Makes opening a session fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.faults.fail_open.store(fail, Ordering::Relaxed);
    }

    /// Delays opening a session.
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        *self.inner.faults.open_delay.lock() = delay;
    }

    /// Makes the next `count` reconnects fail.
    pub fn set_reconnect_failures(&self, count: u32) {
        self.inner
            .faults
            .reconnect_failures
            .store(count, Ordering::Relaxed);
    }

    /// Makes browse and browse-next exchanges fail.
    pub fn set_fail_browse(&self, fail: bool) {
        self.inner.faults.fail_browse.store(fail, Ordering::Relaxed);
    }

    /// Makes browse-next page fetches fail; releasing continuation points
    /// still works.
    pub fn set_fail_browse_next(&self, fail: bool) {
        self.inner.faults.fail_browse_next.store(fail, Ordering::Relaxed);
    }

    /// Makes read exchanges fail.
    pub fn set_fail_read(&self, fail: bool) {
        self.inner.faults.fail_read.store(fail, Ordering::Relaxed);
    }

    /// Makes write exchanges fail.
    pub fn set_fail_write(&self, fail: bool) {
        self.inner.faults.fail_write.store(fail, Ordering::Relaxed);
    }

    /// Makes creating subscriptions fail.
    pub fn set_fail_create_subscription(&self, fail: bool) {
        self.inner
            .faults
            .fail_create_subscription
            .store(fail, Ordering::Relaxed);
    }

    /// Makes deleting subscriptions fail.
    pub fn set_fail_delete_subscription(&self, fail: bool) {
        self.inner
            .faults
            .fail_delete_subscription
            .store(fail, Ordering::Relaxed);
    }

    /// Forces the per-item status of reading `attribute_id` on `node_id`.
    pub fn set_attribute_status(&self, node_id: &NodeId, attribute_id: AttributeId, status: StatusCode) {
        self.inner
            .faults
            .attribute_status
            .write()
            .insert((node_id.clone(), attribute_id), status);
    }

    /// Reports `status` on every open session's keep-alive channel and
    /// marks those sessions lost.
    pub fn fail_keep_alive(&self, status: StatusCode) {
        for session in self.inner.sessions.lock().iter() {
            if session.closed.load(Ordering::Relaxed) {
                continue;
            }
            session.lost.store(true, Ordering::Relaxed);
            let _ = session
                .keep_alive
                .send(KeepAliveStatus::new(&session.id, status));
        }
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Number of sessions opened by `open_session`.
    pub fn open_count(&self) -> u64 {
        self.inner.counters.opens.load(Ordering::Relaxed)
    }

    /// Number of sessions closed.
    pub fn close_count(&self) -> u64 {
        self.inner.counters.closes.load(Ordering::Relaxed)
    }

    /// Number of successful reconnects.
    pub fn reconnect_count(&self) -> u64 {
        self.inner.counters.reconnects.load(Ordering::Relaxed)
    }

    /// Number of individual browse requests received.
    pub fn browse_request_count(&self) -> u64 {
        self.inner.counters.browse_requests.load(Ordering::Relaxed)
    }

    /// Number of browse-next exchanges.
    pub fn browse_next_count(&self) -> u64 {
        self.inner.counters.browse_next_calls.load(Ordering::Relaxed)
    }

    /// Number of continuation points presented that were unknown or reused.
    pub fn invalid_continuation_count(&self) -> u64 {
        self.inner
            .counters
            .invalid_continuations
            .load(Ordering::Relaxed)
    }

    /// Number of read exchanges.
    pub fn read_count(&self) -> u64 {
        self.inner.counters.reads.load(Ordering::Relaxed)
    }

    /// Number of write exchanges.
    pub fn write_count(&self) -> u64 {
        self.inner.counters.writes.load(Ordering::Relaxed)
    }

    /// Number of subscriptions deleted.
    pub fn deleted_subscription_count(&self) -> u64 {
        self.inner
            .counters
            .subscriptions_deleted
            .load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    /// Nodes monitored by a subscription, in creation order.
    pub fn monitored_nodes(&self, subscription_id: u32) -> Vec<NodeId> {
        self.inner
            .subscriptions
            .lock()
            .get(&subscription_id)
            .map(|s| s.items.iter().map(|(_, node)| node.clone()).collect())
            .unwrap_or_default()
    }
}

impl ServerInner {
    fn store_value(&self, node_id: &NodeId, value: OpcUaValue) {
        let data_value = {
            let mut nodes = self.nodes.write();
            let Some(node) = nodes.get_mut(node_id) else {
                return;
            };
            let data_value = DataValue {
                source_timestamp: Some(Utc::now()),
                server_timestamp: Some(Utc::now()),
                ..DataValue::good(value)
            };
            node.value = Some(data_value.clone());
            data_value
        };
        self.notify(node_id, &data_value);
    }

    fn notify(&self, node_id: &NodeId, value: &DataValue) {
        let subscriptions = self.subscriptions.lock();
        for (id, subscription) in subscriptions.iter() {
            for (client_handle, node) in &subscription.items {
                if node == node_id {
                    let _ = subscription.sender.send(DataChangeNotification {
                        subscription_id: *id,
                        client_handle: *client_handle,
                        value: value.clone(),
                    });
                }
            }
        }
    }

    fn new_session(self: &Arc<Self>, endpoint: EndpointDescription) -> Arc<SimulatedSession> {
        let number = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (keep_alive, _) = broadcast::channel(16);
        let shared = Arc::new(SessionShared {
            id: format!("ns=1;i={}", 10_000 + number),
            endpoint,
            keep_alive,
            lost: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.sessions.lock().push(Arc::clone(&shared));
        Arc::new(SimulatedSession {
            shared,
            server: Arc::clone(self),
        })
    }

    fn browse_one(&self, desc: &BrowseDescription) -> BrowseResult {
        let references = {
            let nodes = self.nodes.read();
            let Some(node) = nodes.get(&desc.node_id) else {
                return BrowseResult::failed(StatusCode::BAD_NODE_ID_UNKNOWN);
            };
            if desc.direction == BrowseDirection::Inverse {
                Vec::new()
            } else {
                node.references
                    .iter()
                    .filter(|r| reference_matches(desc, &r.reference_type))
                    .filter_map(|r| describe(&nodes, r))
                    .filter(|r| r.node_class.matches(desc.node_class_mask))
                    .collect()
            }
        };
        self.page(references)
    }

    fn page(&self, mut references: Vec<ReferenceDescription>) -> BrowseResult {
        let page_size = self.page_size.load(Ordering::Relaxed);
        if page_size == 0 || references.len() <= page_size {
            return BrowseResult {
                status: StatusCode::GOOD,
                continuation_point: None,
                references,
            };
        }

        let mut continuations = self.continuations.lock();
        let max = self.max_continuation_points.load(Ordering::Relaxed);
        if max > 0 && continuations.len() >= max {
            return BrowseResult::failed(StatusCode::BAD_NO_CONTINUATION_POINTS);
        }

        let rest = references.split_off(page_size);
        let point = self
            .next_continuation
            .fetch_add(1, Ordering::Relaxed)
            .to_be_bytes()
            .to_vec();
        continuations.insert(point.clone(), rest);

        BrowseResult {
            status: StatusCode::GOOD,
            continuation_point: Some(ContinuationPoint(point)),
            references,
        }
    }

    fn read_one(&self, item: &ReadValueId) -> DataValue {
        if let Some(status) = self
            .faults
            .attribute_status
            .read()
            .get(&(item.node_id.clone(), item.attribute_id))
        {
            return DataValue::bad(*status);
        }

        let nodes = self.nodes.read();
        let Some(node) = nodes.get(&item.node_id) else {
            return DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN);
        };

        let value = match item.attribute_id {
            AttributeId::NodeId => OpcUaValue::String(item.node_id.to_string()),
            AttributeId::NodeClass => OpcUaValue::Int32(node.node_class.value() as i32),
            AttributeId::BrowseName => OpcUaValue::String(node.browse_name.to_string()),
            AttributeId::DisplayName => OpcUaValue::String(node.display_name.clone()),
            AttributeId::Description => OpcUaValue::String(node.description.clone()),
            AttributeId::Value => {
                let Some(value) = &node.value else {
                    return DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID);
                };
                if !node.access_level.is_readable() {
                    return DataValue::bad(StatusCode::BAD_NOT_READABLE);
                }
                return DataValue {
                    server_timestamp: Some(Utc::now()),
                    ..value.clone()
                };
            }
            AttributeId::DataType => match node.value.as_ref().and_then(|v| v.value.data_type()) {
                Some(data_type) => OpcUaValue::String(data_type.name().to_string()),
                None => return DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
            },
            AttributeId::AccessLevel | AttributeId::UserAccessLevel => {
                if node.node_class != NodeClass::Variable {
                    return DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID);
                }
                OpcUaValue::Byte(node.access_level.bits())
            }
        };

        DataValue {
            server_timestamp: Some(Utc::now()),
            ..DataValue::good(value)
        }
    }

    fn write_one(&self, item: &WriteValue) -> StatusCode {
        if item.attribute_id != AttributeId::Value {
            return StatusCode::BAD_NOT_WRITABLE;
        }
        {
            let nodes = self.nodes.read();
            let Some(node) = nodes.get(&item.node_id) else {
                return StatusCode::BAD_NODE_ID_UNKNOWN;
            };
            let Some(current) = &node.value else {
                return StatusCode::BAD_NOT_WRITABLE;
            };
            if !node.access_level.is_writable() {
                return StatusCode::BAD_NOT_WRITABLE;
            }
            if current.value.data_type() != item.value.value.data_type() {
                return StatusCode::BAD_TYPE_MISMATCH;
            }
        }
        self.store_value(&item.node_id, item.value.value.clone());
        StatusCode::GOOD
    }
}

fn describe(nodes: &HashMap<NodeId, SimNode>, reference: &SimReference) -> Option<ReferenceDescription> {
    if let Some((name, node_class)) = &reference.remote {
        return Some(ReferenceDescription {
            reference_type_id: reference.reference_type.clone(),
            is_forward: true,
            node_id: reference.target.clone(),
            browse_name: QualifiedName::new(0, name.clone()),
            display_name: name.clone(),
            node_class: *node_class,
            type_definition: None,
        });
    }

    let target = nodes.get(&reference.target.node_id)?;
    Some(ReferenceDescription {
        reference_type_id: reference.reference_type.clone(),
        is_forward: true,
        node_id: reference.target.clone(),
        browse_name: target.browse_name.clone(),
        display_name: target.display_name.clone(),
        node_class: target.node_class,
        type_definition: target.type_definition.clone().map(ExpandedNodeId::from),
    })
}

// =============================================================================
// SimulatedTransport
// =============================================================================

/// Transport opening sessions on a [`SimulatedServer`].
#[derive(Debug)]
pub struct SimulatedTransport {
    server: Arc<ServerInner>,
}

#[async_trait]
impl OpcUaTransport for SimulatedTransport {
    async fn select_endpoint(&self, url: &str) -> OpcUaResult<EndpointDescription> {
        if self.server.faults.fail_resolve.load(Ordering::Relaxed) || url != self.server.endpoint_url {
            return Err(OpcUaError::connection(ConnectionError::endpoint_resolution(
                url,
                "No endpoint answered at this address",
            )));
        }
        let mut endpoint = EndpointDescription::unsecured(url);
        endpoint.server_name = "Simulated Server".to_string();
        Ok(endpoint)
    }

    async fn open_session(
        &self,
        endpoint: &EndpointDescription,
        identity: &UserIdentity,
        _session_name: &str,
        _timeout: Duration,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>> {
        let delay = *self.server.faults.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.server.faults.fail_open.load(Ordering::Relaxed) {
            return Err(OpcUaError::connection(ConnectionError::session_open_failed(
                &endpoint.endpoint_url,
                "BadIdentityTokenRejected",
            )));
        }
        if let UserIdentity::UserName { username, .. } = identity {
            if username.is_empty() {
                return Err(OpcUaError::connection(ConnectionError::session_open_failed(
                    &endpoint.endpoint_url,
                    "Empty user name",
                )));
            }
        }

        self.server.counters.opens.fetch_add(1, Ordering::Relaxed);
        Ok(self.server.new_session(endpoint.clone()))
    }

    async fn reconnect(
        &self,
        previous: &Arc<dyn OpcUaSession>,
        _timeout: Duration,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>> {
        let failures = &self.server.faults.reconnect_failures;
        if failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(OpcUaError::service_fault(
                "ActivateSession",
                StatusCode::BAD_SERVER_NOT_CONNECTED,
            ));
        }

        self.server.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(self.server.new_session(previous.endpoint().clone()))
    }
}

// =============================================================================
// SimulatedSession
// =============================================================================

/// A session on a [`SimulatedServer`].
#[derive(Debug)]
pub struct SimulatedSession {
    shared: Arc<SessionShared>,
    server: Arc<ServerInner>,
}

impl SimulatedSession {
    fn check(&self, service: &str) -> OpcUaResult<()> {
        if self.shared.closed.load(Ordering::Relaxed) {
            return Err(OpcUaError::service_fault(service, StatusCode::BAD_SESSION_CLOSED));
        }
        if self.shared.lost.load(Ordering::Relaxed) {
            return Err(OpcUaError::service_fault(service, StatusCode::BAD_CONNECTION_CLOSED));
        }
        Ok(())
    }

    fn check_fault(&self, service: &str, flag: &AtomicBool) -> OpcUaResult<()> {
        self.check(service)?;
        if flag.load(Ordering::Relaxed) {
            return Err(OpcUaError::service_fault(service, StatusCode::BAD_COMMUNICATION_ERROR));
        }
        Ok(())
    }
}

#[async_trait]
impl OpcUaSession for SimulatedSession {
    fn session_id(&self) -> &str {
        &self.shared.id
    }

    fn endpoint(&self) -> &EndpointDescription {
        &self.shared.endpoint
    }

    fn keep_alive(&self) -> broadcast::Receiver<KeepAliveStatus> {
        self.shared.keep_alive.subscribe()
    }

    async fn close(&self, _timeout: Duration) -> OpcUaResult<()> {
        if self.shared.closed.swap(true, Ordering::Relaxed) {
            return Err(OpcUaError::service_fault("CloseSession", StatusCode::BAD_SESSION_CLOSED));
        }
        self.server
            .sessions
            .lock()
            .retain(|s| !Arc::ptr_eq(s, &self.shared));
        self.server.counters.closes.fetch_add(1, Ordering::Relaxed);
        if self.shared.lost.load(Ordering::Relaxed) {
            return Err(OpcUaError::connection(ConnectionError::closed("session was lost")));
        }
        Ok(())
    }

    async fn browse(&self, requests: &[BrowseDescription]) -> OpcUaResult<Vec<BrowseResult>> {
        self.check_fault("Browse", &self.server.faults.fail_browse)?;
        self.server
            .counters
            .browse_requests
            .fetch_add(requests.len() as u64, Ordering::Relaxed);
        Ok(requests.iter().map(|r| self.server.browse_one(r)).collect())
    }

    async fn browse_next(
        &self,
        release: bool,
        continuation_points: &[ContinuationPoint],
    ) -> OpcUaResult<Vec<BrowseResult>> {
        self.check_fault("BrowseNext", &self.server.faults.fail_browse)?;
        if !release && self.server.faults.fail_browse_next.load(Ordering::Relaxed) {
            return Err(OpcUaError::service_fault(
                "BrowseNext",
                StatusCode::BAD_COMMUNICATION_ERROR,
            ));
        }
        self.server
            .counters
            .browse_next_calls
            .fetch_add(1, Ordering::Relaxed);

        let results = continuation_points
            .iter()
            .map(|point| {
                let rest = self.server.continuations.lock().remove(point.as_bytes());
                match rest {
                    None => {
                        self.server
                            .counters
                            .invalid_continuations
                            .fetch_add(1, Ordering::Relaxed);
                        BrowseResult::failed(StatusCode::BAD_CONTINUATION_POINT_INVALID)
                    }
                    Some(_) if release => BrowseResult {
                        status: StatusCode::GOOD,
                        continuation_point: None,
                        references: Vec::new(),
                    },
                    Some(rest) => self.server.page(rest),
                }
            })
            .collect();
        Ok(results)
    }

    async fn read(&self, items: &[ReadValueId]) -> OpcUaResult<Vec<DataValue>> {
        self.check_fault("Read", &self.server.faults.fail_read)?;
        if items.is_empty() {
            return Err(OpcUaError::service_fault("Read", StatusCode::BAD_NOTHING_TO_DO));
        }
        self.server.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(items.iter().map(|item| self.server.read_one(item)).collect())
    }

    async fn write(&self, items: &[WriteValue]) -> OpcUaResult<Vec<StatusCode>> {
        self.check_fault("Write", &self.server.faults.fail_write)?;
        if items.is_empty() {
            return Err(OpcUaError::service_fault("Write", StatusCode::BAD_NOTHING_TO_DO));
        }
        self.server.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(items.iter().map(|item| self.server.write_one(item)).collect())
    }

    async fn create_subscription(
        &self,
        _parameters: &SubscriptionParameters,
        notifications: mpsc::UnboundedSender<DataChangeNotification>,
    ) -> OpcUaResult<u32> {
        self.check_fault(
            "CreateSubscription",
            &self.server.faults.fail_create_subscription,
        )?;
        let id = self.server.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.server.subscriptions.lock().insert(
            id,
            SimSubscription {
                sender: notifications,
                items: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        self.check("CreateMonitoredItems")?;

        let known: Vec<bool> = {
            let nodes = self.server.nodes.read();
            items
                .iter()
                .map(|item| {
                    nodes
                        .get(&item.node_id)
                        .map_or(false, |n| n.value.is_some())
                })
                .collect()
        };

        let mut subscriptions = self.server.subscriptions.lock();
        let subscription = subscriptions.get_mut(&subscription_id).ok_or_else(|| {
            OpcUaError::service_fault(
                "CreateMonitoredItems",
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            )
        })?;

        Ok(items
            .iter()
            .zip(known)
            .map(|(item, known)| {
                if !known {
                    return MonitoredItemResult {
                        status: StatusCode::BAD_NODE_ID_UNKNOWN,
                        monitored_item_id: 0,
                        revised_sampling_interval: Duration::ZERO,
                    };
                }
                subscription
                    .items
                    .push((item.client_handle, item.node_id.clone()));
                MonitoredItemResult {
                    status: StatusCode::GOOD,
                    monitored_item_id: self
                        .server
                        .next_monitored_item
                        .fetch_add(1, Ordering::Relaxed),
                    revised_sampling_interval: item.sampling_interval,
                }
            })
            .collect())
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.check_fault(
            "DeleteSubscriptions",
            &self.server.faults.fail_delete_subscription,
        )?;
        match self.server.subscriptions.lock().remove(&subscription_id) {
            Some(_) => {
                self.server
                    .counters
                    .subscriptions_deleted
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(OpcUaError::service_fault(
                "DeleteSubscriptions",
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::RESULT_MASK_ALL;

    async fn open(server: &SimulatedServer) -> Arc<dyn OpcUaSession> {
        let transport = server.transport();
        let endpoint = transport.select_endpoint(server.endpoint_url()).await.unwrap();
        transport
            .open_session(&endpoint, &UserIdentity::Anonymous, "test", Duration::from_secs(1))
            .await
            .unwrap()
    }

    fn children_of(node_id: NodeId) -> BrowseDescription {
        BrowseDescription {
            node_id,
            direction: BrowseDirection::Forward,
            reference_type_id: HIERARCHICAL_REFERENCES,
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: RESULT_MASK_ALL,
        }
    }

    #[tokio::test]
    async fn test_select_endpoint_rejects_other_urls() {
        let server = SimulatedServer::demo();
        let transport = server.transport();
        assert!(transport.select_endpoint("opc.tcp://other:4840").await.is_err());
        server.set_fail_resolve(true);
        assert!(transport.select_endpoint(server.endpoint_url()).await.is_err());
    }

    #[tokio::test]
    async fn test_browse_pages_and_continuation_cap() {
        let server = SimulatedServer::plant();
        server.set_page_size(3);
        server.set_max_continuation_points(1);
        let session = open(&server).await;

        let line = NodeId::string(2, "Plant.Line1");
        let results = session
            .browse(&[children_of(line.clone()), children_of(line)])
            .await
            .unwrap();
        assert_eq!(results[0].references.len(), 3);
        assert!(results[0].continuation_point.is_some());
        assert_eq!(results[1].status, StatusCode::BAD_NO_CONTINUATION_POINTS);

        let point = results[0].continuation_point.clone().unwrap();
        let next = session.browse_next(false, &[point.clone()]).await.unwrap();
        assert_eq!(next[0].references.len(), 3);

        let reused = session.browse_next(false, &[point]).await.unwrap();
        assert_eq!(reused[0].status, StatusCode::BAD_CONTINUATION_POINT_INVALID);
        assert_eq!(server.invalid_continuation_count(), 1);
    }

    #[tokio::test]
    async fn test_read_write_statuses() {
        let server = SimulatedServer::demo();
        let session = open(&server).await;
        let var_x = NodeId::string(2, "FolderA.VarX");

        let statuses = session
            .write(&[
                WriteValue::value(var_x.clone(), OpcUaValue::Int32(7)),
                WriteValue::value(var_x.clone(), OpcUaValue::from("wrong")),
                WriteValue::value(NodeId::string(2, "Missing"), OpcUaValue::Int32(1)),
            ])
            .await
            .unwrap();
        assert_eq!(
            statuses,
            vec![
                StatusCode::GOOD,
                StatusCode::BAD_TYPE_MISMATCH,
                StatusCode::BAD_NODE_ID_UNKNOWN
            ]
        );

        let values = session
            .read(&[
                ReadValueId::value(var_x.clone()),
                ReadValueId::attribute(var_x, AttributeId::AccessLevel),
            ])
            .await
            .unwrap();
        assert_eq!(values[0].value, OpcUaValue::Int32(7));
        assert_eq!(values[1].value, OpcUaValue::Byte(3));
    }

    #[tokio::test]
    async fn test_lost_session_rejects_requests() {
        let server = SimulatedServer::demo();
        let session = open(&server).await;
        let mut keep_alive = session.keep_alive();

        server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
        let report = keep_alive.recv().await.unwrap();
        assert!(!report.is_good());

        let err = session
            .read(&[ReadValueId::value(NodeId::OBJECTS_FOLDER)])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::BAD_CONNECTION_CLOSED));
    }

    #[tokio::test]
    async fn test_subscription_notifications() {
        let server = SimulatedServer::demo();
        let session = open(&server).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let var_x = NodeId::string(2, "FolderA.VarX");

        let id = session
            .create_subscription(
                &SubscriptionParameters {
                    display_name: "test".into(),
                    publishing_interval: Duration::ZERO,
                    lifetime_count: u32::MAX,
                    keepalive_count: u32::MAX,
                    max_notifications_per_publish: u32::MAX,
                    priority: 100,
                    publishing_enabled: true,
                },
                tx,
            )
            .await
            .unwrap();
        session
            .create_monitored_items(
                id,
                &[MonitoredItemRequest {
                    client_handle: 9,
                    node_id: var_x.clone(),
                    attribute_id: AttributeId::Value,
                    sampling_interval: Duration::from_millis(100),
                    queue_size: 1,
                    discard_oldest: true,
                    display_name: "VarX".into(),
                }],
            )
            .await
            .unwrap();

        server.set_value(&var_x, 5i32);
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.client_handle, 9);
        assert_eq!(notification.value.value, OpcUaValue::Int32(5));

        session.delete_subscription(id).await.unwrap();
        assert_eq!(server.subscription_count(), 0);
    }
}
