// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Keyed subscription registry.
//!
//! The registry keeps named groups of monitored items. Each key maps to one
//! server-side subscription; subscribing with a key that already exists
//! replaces the old group.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    SubscriptionRegistry                         │
//! │          (key → subscription table behind one mutex)            │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │  "grp1"         │ │  "line1"        │ │  "alarms"       │
//! │  (ID: 1)        │ │  (ID: 4)        │ │  (ID: 7)        │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │   dispatcher    │ │   dispatcher    │ │   dispatcher    │
//! │ → callback(key, │ │ → callback(key, │ │ → callback(key, │
//! │   item, value)  │ │   item, value)  │ │   item, value)  │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! Local state is authoritative. When the server refuses to delete a
//! replaced group the entry is still dropped locally and the failure is
//! logged and counted as an orphan. A group removed while the session is
//! reconnecting is deleted on the server once the session is back.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{OpcUaError, OpcUaResult, SubscriptionError};
use crate::types::{AttributeId, NodeId, SubscriptionSettings};

use super::session::{ConnectionState, SessionManager};
use super::transport::{
    DataChangeNotification, DataValue, MonitoredItemRequest, OpcUaSession, SubscriptionParameters,
};

// =============================================================================
// Monitored items
// =============================================================================

/// A node to monitor, requested at subscribe time.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemSpec {
    /// Node to monitor.
    pub node_id: NodeId,

    /// Sampling interval; the registry default when `None`.
    pub sampling_interval: Option<Duration>,

    /// Display name; the node id text when `None`.
    pub display_name: Option<String>,
}

impl MonitoredItemSpec {
    /// Creates an item with default sampling and display name.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            sampling_interval: None,
            display_name: None,
        }
    }

    /// Sets the sampling interval.
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = Some(interval);
        self
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl From<NodeId> for MonitoredItemSpec {
    fn from(node_id: NodeId) -> Self {
        Self::new(node_id)
    }
}

/// A monitored item of a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    /// Client handle tagging this item's notifications.
    pub client_handle: u32,

    /// Server-assigned item id.
    pub monitored_item_id: u32,

    /// Monitored node.
    pub node_id: NodeId,

    /// Display name.
    pub display_name: String,

    /// Sampling interval granted by the server.
    pub sampling_interval: Duration,
}

impl fmt::Display for MonitoredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.node_id)
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Receives data changes for a subscription.
///
/// Invoked from the subscription's dispatcher task. Implementations must
/// not block for long; hand heavy work off to another task.
pub trait NotificationCallback: Send + Sync + 'static {
    /// Called once per delivered change.
    fn on_notify(&self, key: &str, item: &MonitoredItem, notification: &DataChangeNotification);
}

impl<F> NotificationCallback for F
where
    F: Fn(&str, &MonitoredItem, &DataChangeNotification) + Send + Sync + 'static,
{
    fn on_notify(&self, key: &str, item: &MonitoredItem, notification: &DataChangeNotification) {
        self(key, item, notification)
    }
}

/// An owned notification as forwarded by [`ChannelCallback`].
#[derive(Debug, Clone, PartialEq)]
pub struct ItemNotification {
    /// Subscription key.
    pub key: String,

    /// Item that changed.
    pub item: MonitoredItem,

    /// New value.
    pub value: DataValue,
}

/// A channel-based callback.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    sender: mpsc::Sender<ItemNotification>,
}

impl ChannelCallback {
    /// Creates a new channel callback.
    pub fn new(sender: mpsc::Sender<ItemNotification>) -> Self {
        Self { sender }
    }

    /// Creates a new channel callback with a receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<ItemNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl NotificationCallback for ChannelCallback {
    fn on_notify(&self, key: &str, item: &MonitoredItem, notification: &DataChangeNotification) {
        let forwarded = ItemNotification {
            key: key.to_string(),
            item: item.clone(),
            value: notification.value.clone(),
        };
        if let Err(e) = self.sender.try_send(forwarded) {
            tracing::debug!(key = %key, node_id = %item.node_id, error = %e, "Notification dropped");
        }
    }
}

// =============================================================================
// Registry entries
// =============================================================================

/// A snapshot of one registered subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    /// Subscription key.
    pub key: String,

    /// Server-assigned subscription id.
    pub subscription_id: u32,

    /// Monitored items in request order.
    pub items: Vec<MonitoredItem>,

    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
}

struct RegisteredSubscription {
    info: SubscriptionInfo,
    dispatcher: JoinHandle<()>,
}

impl Drop for RegisteredSubscription {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Registry statistics.
#[derive(Debug, Default)]
pub struct RegistryStatistics {
    created: AtomicU64,
    replaced: AtomicU64,
    removed: AtomicU64,
    orphaned: AtomicU64,
    deferred: AtomicU64,
    notifications: AtomicU64,
}

impl RegistryStatistics {
    /// Subscriptions created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Subscriptions replaced by a later subscribe with the same key.
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    /// Subscriptions removed by unsubscribe.
    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Server-side subscriptions whose delete failed.
    pub fn orphaned(&self) -> u64 {
        self.orphaned.load(Ordering::Relaxed)
    }

    /// Server-side deletes postponed until the session returned.
    pub fn deferred(&self) -> u64 {
        self.deferred.load(Ordering::Relaxed)
    }

    /// Notifications delivered to callbacks.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Resets all counters.
    pub fn reset(&self) {
        self.created.store(0, Ordering::Relaxed);
        self.replaced.store(0, Ordering::Relaxed);
        self.removed.store(0, Ordering::Relaxed);
        self.orphaned.store(0, Ordering::Relaxed);
        self.deferred.store(0, Ordering::Relaxed);
        self.notifications.store(0, Ordering::Relaxed);
    }
}

/// Server-side deletes waiting for the session to come back.
#[derive(Default)]
struct DeferredDeletes {
    pending: Vec<SubscriptionInfo>,
    drainer: Option<JoinHandle<()>>,
}

// =============================================================================
// SubscriptionRegistry
// =============================================================================

/// Keyed table of live subscriptions.
///
/// Create, replace and remove run one at a time under a registry-wide lock,
/// so a key never addresses two groups at once.
///
/// # Examples
///
/// ```
/// use bhs_opcua::client::{DataChangeNotification, MonitoredItem, SessionManager, SubscriptionRegistry};
/// use bhs_opcua::simulation::SimulatedServer;
/// use bhs_opcua::types::{NodeId, OpcUaConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> bhs_opcua::OpcUaResult<()> {
/// let server = SimulatedServer::demo();
/// let session = SessionManager::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
/// session.connect(server.endpoint_url()).await?;
///
/// let registry = SubscriptionRegistry::new(session);
/// registry
///     .subscribe(
///         "grp1",
///         &[NodeId::string(2, "FolderA.VarX")],
///         |key: &str, item: &MonitoredItem, change: &DataChangeNotification| {
///             println!("{key}: {item} = {}", change.value.value);
///         },
///     )
///     .await?;
/// assert!(registry.contains("grp1").await);
/// registry.unsubscribe("grp1").await?;
/// # Ok(())
/// # }
/// ```
pub struct SubscriptionRegistry {
    session: SessionManager,
    settings: SubscriptionSettings,
    entries: Mutex<HashMap<String, RegisteredSubscription>>,
    next_handle: AtomicU32,
    stats: Arc<RegistryStatistics>,
    deferred: Arc<parking_lot::Mutex<DeferredDeletes>>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Creates a registry using the session's subscription settings.
    pub fn new(session: SessionManager) -> Self {
        let settings = session.config().subscription.clone();
        Self::with_settings(session, settings)
    }

    /// Creates a registry with explicit settings.
    pub fn with_settings(session: SessionManager, settings: SubscriptionSettings) -> Self {
        Self {
            session,
            settings,
            entries: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(1),
            stats: Arc::new(RegistryStatistics::default()),
            deferred: Arc::new(parking_lot::Mutex::new(DeferredDeletes::default())),
        }
    }

    /// Returns the subscription settings.
    pub fn settings(&self) -> &SubscriptionSettings {
        &self.settings
    }

    /// Returns the registry statistics.
    pub fn stats(&self) -> &RegistryStatistics {
        &self.stats
    }

    /// Subscribes `key` to `node_ids` at the default sampling interval.
    pub async fn subscribe(
        &self,
        key: &str,
        node_ids: &[NodeId],
        callback: impl NotificationCallback,
    ) -> OpcUaResult<SubscriptionInfo> {
        let items = node_ids.iter().cloned().map(MonitoredItemSpec::new).collect();
        self.subscribe_with(key, items, callback).await
    }

    /// Subscribes `key` to a single node.
    pub async fn subscribe_one(
        &self,
        key: &str,
        node_id: &NodeId,
        callback: impl NotificationCallback,
    ) -> OpcUaResult<SubscriptionInfo> {
        self.subscribe_with(key, vec![MonitoredItemSpec::new(node_id.clone())], callback)
            .await
    }

    /// Subscribes `key` to `items`, replacing any existing group for `key`.
    ///
    /// Every item must be accepted by the server; otherwise the new
    /// subscription is deleted again and an error is returned. The old group
    /// is gone either way.
    pub async fn subscribe_with(
        &self,
        key: &str,
        items: Vec<MonitoredItemSpec>,
        callback: impl NotificationCallback,
    ) -> OpcUaResult<SubscriptionInfo> {
        if key.trim().is_empty() {
            return Err(OpcUaError::subscription(SubscriptionError::invalid_key(
                key,
                "key must not be empty",
            )));
        }
        if items.is_empty() {
            return Err(OpcUaError::subscription(SubscriptionError::no_monitored_items(key)));
        }

        let session = self.session.session()?;
        let mut entries = self.entries.lock().await;

        if let Some(old) = entries.remove(key) {
            self.stats.replaced.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.delete_remote(session.as_ref(), &old.info).await {
                self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    subscription_id = old.info.subscription_id,
                    error = %e,
                    "Replaced subscription could not be deleted on the server"
                );
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let parameters = SubscriptionParameters {
            display_name: key.to_string(),
            publishing_interval: self.settings.publishing_interval,
            lifetime_count: self.settings.lifetime_count,
            keepalive_count: self.settings.keepalive_count,
            max_notifications_per_publish: self.settings.max_notifications_per_publish,
            priority: self.settings.priority,
            publishing_enabled: true,
        };
        let subscription_id = self
            .bounded("CreateSubscription", session.create_subscription(&parameters, sender))
            .await
            .map_err(|e| {
                OpcUaError::subscription(SubscriptionError::creation_failed(key, e.to_string()))
            })?;

        let requests: Vec<MonitoredItemRequest> = items
            .into_iter()
            .map(|spec| MonitoredItemRequest {
                client_handle: self.next_handle.fetch_add(1, Ordering::Relaxed),
                display_name: spec.display_name.unwrap_or_else(|| spec.node_id.to_string()),
                sampling_interval: spec
                    .sampling_interval
                    .unwrap_or(self.settings.sampling_interval),
                node_id: spec.node_id,
                attribute_id: AttributeId::Value,
                queue_size: self.settings.queue_size,
                discard_oldest: true,
            })
            .collect();

        let monitored = match self.create_items(session.as_ref(), key, subscription_id, &requests).await {
            Ok(monitored) => monitored,
            Err(e) => {
                if let Err(delete_error) = self.bounded("DeleteSubscriptions", session.delete_subscription(subscription_id)).await {
                    self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        key = %key,
                        subscription_id,
                        error = %delete_error,
                        "Incomplete subscription could not be deleted on the server"
                    );
                }
                return Err(e);
            }
        };

        let info = SubscriptionInfo {
            key: key.to_string(),
            subscription_id,
            items: monitored,
            created_at: Utc::now(),
        };
        let dispatcher = spawn_dispatcher(
            key.to_string(),
            &info.items,
            receiver,
            Arc::new(callback),
            Arc::clone(&self.stats),
        );
        entries.insert(
            key.to_string(),
            RegisteredSubscription {
                info: info.clone(),
                dispatcher,
            },
        );
        self.stats.created.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            key = %key,
            subscription_id,
            monitored_items = info.items.len(),
            "Subscription created"
        );
        Ok(info)
    }

    /// Removes `key` and deletes its subscription on the server.
    ///
    /// Returns `false` if `key` was not registered. The entry is removed
    /// locally even when the server-side delete fails; that failure is
    /// returned as an error. While the session is reconnecting the delete
    /// is postponed until it is back.
    pub async fn unsubscribe(&self, key: &str) -> OpcUaResult<bool> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.remove(key) else {
            return Ok(false);
        };
        self.stats.removed.fetch_add(1, Ordering::Relaxed);

        let result = self.release(&entry.info).await;
        drop(entries);
        result.map(|()| true)
    }

    /// Removes every subscription and returns how many were registered.
    ///
    /// The table is always cleared. If any server-side delete fails the
    /// first failure is returned after all deletes were attempted.
    pub async fn unsubscribe_all(&self) -> OpcUaResult<usize> {
        let mut entries = self.entries.lock().await;
        let drained: Vec<RegisteredSubscription> = entries.drain().map(|(_, entry)| entry).collect();
        let count = drained.len();

        let mut first_error = None;
        for entry in &drained {
            self.stats.removed.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.release(&entry.info).await {
                first_error.get_or_insert(e);
            }
        }
        drop(entries);

        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Returns the registered keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns `true` if `key` is registered.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    /// Returns a snapshot of the subscription registered for `key`.
    pub async fn get(&self, key: &str) -> Option<SubscriptionInfo> {
        self.entries.lock().await.get(key).map(|entry| entry.info.clone())
    }

    /// Returns the number of registered subscriptions.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn bounded<T>(
        &self,
        service: &'static str,
        future: impl Future<Output = OpcUaResult<T>>,
    ) -> OpcUaResult<T> {
        let timeout = self.session.config().request_timeout;
        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| OpcUaError::operation_timeout(service, timeout))?
    }

    async fn create_items(
        &self,
        session: &dyn OpcUaSession,
        key: &str,
        subscription_id: u32,
        requests: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItem>> {
        let results = self
            .bounded(
                "CreateMonitoredItems",
                session.create_monitored_items(subscription_id, requests),
            )
            .await
            .map_err(|e| {
                OpcUaError::subscription(SubscriptionError::creation_failed(key, e.to_string()))
            })?;

        if results.len() != requests.len() {
            return Err(OpcUaError::subscription(SubscriptionError::creation_failed(
                key,
                format!(
                    "CreateMonitoredItems returned {} results for {} items",
                    results.len(),
                    requests.len()
                ),
            )));
        }

        requests
            .iter()
            .zip(results)
            .map(|(request, result)| {
                if result.status.is_bad() {
                    return Err(OpcUaError::subscription(
                        SubscriptionError::monitored_items_failed(
                            key,
                            request.node_id.to_string(),
                            result.status,
                        ),
                    ));
                }
                Ok(MonitoredItem {
                    client_handle: request.client_handle,
                    monitored_item_id: result.monitored_item_id,
                    node_id: request.node_id.clone(),
                    display_name: request.display_name.clone(),
                    sampling_interval: result.revised_sampling_interval,
                })
            })
            .collect()
    }

    async fn delete_remote(&self, session: &dyn OpcUaSession, info: &SubscriptionInfo) -> OpcUaResult<()> {
        self.bounded("DeleteSubscriptions", session.delete_subscription(info.subscription_id))
            .await
            .map_err(|e| {
                OpcUaError::subscription(SubscriptionError::delete_failed(
                    &info.key,
                    info.subscription_id,
                    e.to_string(),
                ))
            })
    }

    /// Deletes a removed entry on the server.
    ///
    /// Without a session the delete is postponed while one may still come
    /// back, and reported as a failure once the session is closed for good.
    async fn release(&self, info: &SubscriptionInfo) -> OpcUaResult<()> {
        let session = match self.session.session() {
            Ok(session) => session,
            Err(_) if self.session.state() == ConnectionState::Disconnected => {
                self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %info.key,
                    subscription_id = info.subscription_id,
                    "No session, subscription could not be deleted on the server"
                );
                return Err(OpcUaError::subscription(SubscriptionError::delete_failed(
                    &info.key,
                    info.subscription_id,
                    "no session",
                )));
            }
            Err(_) => {
                self.defer_delete(info.clone());
                return Ok(());
            }
        };

        match self.delete_remote(session.as_ref(), info).await {
            Ok(()) => {
                tracing::info!(
                    key = %info.key,
                    subscription_id = info.subscription_id,
                    "Subscription removed"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                e.log("unsubscribe");
                Err(e)
            }
        }
    }

    fn defer_delete(&self, info: SubscriptionInfo) {
        self.stats.deferred.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            key = %info.key,
            subscription_id = info.subscription_id,
            state = %self.session.state(),
            "No session, server-side delete deferred until the session returns"
        );

        let mut deferred = self.deferred.lock();
        deferred.pending.push(info);
        if deferred.drainer.is_none() {
            deferred.drainer = Some(tokio::spawn(drain_deferred(
                self.session.clone(),
                Arc::clone(&self.deferred),
                Arc::clone(&self.stats),
            )));
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        if let Some(drainer) = self.deferred.lock().drainer.take() {
            drainer.abort();
        }
    }
}

/// Waits for the session to settle, then deletes the postponed
/// subscriptions. If the session closes instead they are orphaned.
async fn drain_deferred(
    session: SessionManager,
    deferred: Arc<parking_lot::Mutex<DeferredDeletes>>,
    stats: Arc<RegistryStatistics>,
) {
    let mut events = session.subscribe_events();
    let live = loop {
        match session.session() {
            Ok(live) => break Some(live),
            Err(_) if session.state() == ConnectionState::Disconnected => break None,
            Err(_) => {}
        }
        if let Err(broadcast::error::RecvError::Closed) = events.recv().await {
            break None;
        }
    };

    let pending = {
        let mut deferred = deferred.lock();
        deferred.drainer = None;
        std::mem::take(&mut deferred.pending)
    };

    let timeout = session.config().request_timeout;
    for info in pending {
        let outcome = match &live {
            Some(live) => {
                match tokio::time::timeout(timeout, live.delete_subscription(info.subscription_id)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", timeout)),
                }
            }
            None => Err("session closed before it returned".to_string()),
        };

        match outcome {
            Ok(()) => tracing::info!(
                key = %info.key,
                subscription_id = info.subscription_id,
                "Deferred subscription delete completed"
            ),
            Err(reason) => {
                stats.orphaned.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %info.key,
                    subscription_id = info.subscription_id,
                    reason = %reason,
                    "Deferred subscription delete failed, server subscription orphaned"
                );
            }
        }
    }
}

fn spawn_dispatcher(
    key: String,
    items: &[MonitoredItem],
    mut receiver: mpsc::UnboundedReceiver<DataChangeNotification>,
    callback: Arc<dyn NotificationCallback>,
    stats: Arc<RegistryStatistics>,
) -> JoinHandle<()> {
    let by_handle: HashMap<u32, MonitoredItem> = items
        .iter()
        .map(|item| (item.client_handle, item.clone()))
        .collect();

    tokio::spawn(async move {
        while let Some(notification) = receiver.recv().await {
            match by_handle.get(&notification.client_handle) {
                Some(item) => {
                    stats.notifications.fetch_add(1, Ordering::Relaxed);
                    callback.on_notify(&key, item, &notification);
                }
                None => tracing::trace!(
                    key = %key,
                    client_handle = notification.client_handle,
                    "Notification for unknown item"
                ),
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::OpcUaValue;
    use crate::simulation::SimulatedServer;
    use crate::types::{OpcUaConfig, StatusCode};

    fn var_x() -> NodeId {
        NodeId::string(2, "FolderA.VarX")
    }

    fn var_y() -> NodeId {
        NodeId::string(2, "FolderA.VarY")
    }

    async fn registry(server: &SimulatedServer) -> SubscriptionRegistry {
        let session = SessionManager::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
        session.connect(server.endpoint_url()).await.unwrap();
        SubscriptionRegistry::new(session)
    }

    fn ignore(_: &str, _: &MonitoredItem, _: &DataChangeNotification) {}

    #[tokio::test]
    async fn test_subscribe_delivers_with_key() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;
        let (callback, mut rx) = ChannelCallback::with_channel(16);

        let info = registry.subscribe("grp1", &[var_x()], callback).await.unwrap();
        assert_eq!(info.items.len(), 1);
        assert_eq!(info.items[0].display_name, var_x().to_string());
        assert_eq!(info.items[0].sampling_interval, Duration::from_millis(100));

        server.set_value(&var_x(), 7i32);
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.key, "grp1");
        assert_eq!(notification.item.node_id, var_x());
        assert_eq!(notification.value.value, OpcUaValue::Int32(7));
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_group() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        let first = registry.subscribe("grp1", &[var_x()], ignore).await.unwrap();
        let second = registry.subscribe("grp1", &[var_y()], ignore).await.unwrap();

        assert_eq!(registry.keys().await, vec!["grp1".to_string()]);
        assert_ne!(first.subscription_id, second.subscription_id);
        let local = registry.get("grp1").await.unwrap();
        assert_eq!(local.items.iter().map(|i| i.node_id.clone()).collect::<Vec<_>>(), vec![var_y()]);
        assert_eq!(server.subscription_count(), 1);
        assert_eq!(registry.stats().replaced(), 1);
    }

    #[tokio::test]
    async fn test_replace_survives_delete_failure() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        registry.subscribe("grp1", &[var_x()], ignore).await.unwrap();
        server.set_fail_delete_subscription(true);
        let info = registry.subscribe("grp1", &[var_y()], ignore).await.unwrap();

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("grp1").await.unwrap().subscription_id, info.subscription_id);
        assert_eq!(registry.stats().orphaned(), 1);
        assert_eq!(server.subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_per_item_sampling_and_names() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        let info = registry
            .subscribe_with(
                "custom",
                vec![
                    MonitoredItemSpec::new(var_x())
                        .with_sampling_interval(Duration::from_millis(250))
                        .with_display_name("X"),
                    var_y().into(),
                ],
                ignore,
            )
            .await
            .unwrap();
        assert_eq!(info.items[0].sampling_interval, Duration::from_millis(250));
        assert_eq!(info.items[0].display_name, "X");
        assert_eq!(info.items[1].sampling_interval, Duration::from_millis(100));
        assert_eq!(server.monitored_nodes(info.subscription_id), vec![var_x(), var_y()]);
    }

    #[tokio::test]
    async fn test_rejected_item_fails_subscribe() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        let err = registry
            .subscribe("bad", &[var_x(), NodeId::string(2, "Missing")], ignore)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
        assert!(!registry.contains("bad").await);
        assert_eq!(server.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        assert!(registry.subscribe("", &[var_x()], ignore).await.is_err());
        assert!(registry.subscribe("empty", &[], ignore).await.is_err());

        server.set_fail_create_subscription(true);
        let err = registry.subscribe("grp1", &[var_x()], ignore).await.unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Subscription(SubscriptionError::CreationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        assert!(!registry.unsubscribe("absent").await.unwrap());
        registry.subscribe_one("grp1", &var_x(), ignore).await.unwrap();
        assert!(registry.unsubscribe("grp1").await.unwrap());
        assert!(registry.is_empty().await);
        assert_eq!(server.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_reports_delete_failure() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        registry.subscribe_one("grp1", &var_x(), ignore).await.unwrap();
        server.set_fail_delete_subscription(true);
        let err = registry.unsubscribe("grp1").await.unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Subscription(SubscriptionError::DeleteFailed { .. })
        ));
        assert!(!registry.contains("grp1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_while_reconnecting_deletes_after_reconnect() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;
        registry.subscribe_one("grp1", &var_x(), ignore).await.unwrap();

        server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.session.state(), ConnectionState::Reconnecting);

        assert!(registry.unsubscribe("grp1").await.unwrap());
        assert!(!registry.contains("grp1").await);
        assert_eq!(registry.stats().deferred(), 1);
        assert_eq!(server.subscription_count(), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(registry.session.is_connected());
        assert_eq!(server.subscription_count(), 0);
        assert_eq!(registry.stats().orphaned(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_delete_orphaned_when_session_closes() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;
        registry.subscribe_one("grp1", &var_x(), ignore).await.unwrap();

        server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.unsubscribe("grp1").await.unwrap());

        registry.session.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.stats().orphaned(), 1);
        assert_eq!(server.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_after_disconnect_reports_orphan() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;
        registry.subscribe_one("grp1", &var_x(), ignore).await.unwrap();

        registry.session.disconnect().await.unwrap();
        let err = registry.unsubscribe("grp1").await.unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Subscription(SubscriptionError::DeleteFailed { .. })
        ));
        assert!(!registry.contains("grp1").await);
        assert_eq!(registry.stats().orphaned(), 1);
        assert_eq!(registry.stats().deferred(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_all() {
        let server = SimulatedServer::demo();
        let registry = registry(&server).await;

        registry.subscribe_one("a", &var_x(), ignore).await.unwrap();
        registry.subscribe_one("b", &var_y(), ignore).await.unwrap();
        assert_eq!(registry.unsubscribe_all().await.unwrap(), 2);
        assert!(registry.is_empty().await);
        assert_eq!(server.subscription_count(), 0);
    }
}
