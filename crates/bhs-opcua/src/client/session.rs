// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session management.
//!
//! [`SessionManager`] owns the single active session. It connects, watches
//! the session's keep-alive reports, drives reconnection when the session is
//! lost, and publishes [`ConnectionEvent`]s to observers.
//!
//! # State machine
//!
//! ```text
//!                connect()               open ok
//! Disconnected ───────────▶ Connecting ───────────▶ Connected
//!      ▲                        │                    │     ▲
//!      │        open failed     │     keep-alive bad │     │ reconnect ok
//!      ├────────────────────────┘                    ▼     │
//!      │          attempts exhausted            Reconnecting
//!      └─────────────────────────────────────────────┘
//!
//! disconnect() is accepted in every state and always lands in Disconnected.
//! ```
//!
//! The state and the session handle live together in one lock, so a
//! reconnect replaces the handle atomically for every component holding the
//! manager.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, OpcUaError, OpcUaResult, SessionError};
use crate::types::OpcUaConfig;

use super::transport::{KeepAliveStatus, OpcUaSession, OpcUaTransport};

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// ConnectionState
// =============================================================================

/// State of the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,

    /// A session is being opened.
    Connecting,

    /// A session is active and ready for use.
    Connected,

    /// The session was lost and a reconnect is scheduled or running.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if a session is active.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the state is transitional.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// =============================================================================
// ConnectionEvent
// =============================================================================

/// Notification published on connection changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A session was opened by `connect`.
    Connected {
        /// Server-assigned session id.
        session_id: String,
        /// Endpoint URL.
        endpoint: String,
    },

    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },

    /// A lost session was replaced.
    Reconnected {
        /// Server-assigned id of the new session.
        session_id: String,
        /// Attempts it took.
        attempts: u32,
    },

    /// The reconnect policy ran out of attempts.
    ReconnectAbandoned {
        /// Attempts made.
        attempts: u32,
    },

    /// The connection was closed.
    Disconnected,
}

impl ConnectionEvent {
    /// Returns `true` for events that mean a usable session was established.
    ///
    /// Observers that cache address-space views refresh on these.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Reconnected { .. })
    }
}

type StateCallback = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

// =============================================================================
// SessionManager
// =============================================================================

/// Manages the single active OPC UA session.
///
/// Cloning is cheap; clones share the same session.
///
/// # Thread Safety
///
/// The SessionManager is thread-safe and can be shared across tasks.
///
/// # Examples
///
/// ```
/// use bhs_opcua::client::{ConnectionState, SessionManager};
/// use bhs_opcua::simulation::SimulatedServer;
/// use bhs_opcua::types::OpcUaConfig;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> bhs_opcua::OpcUaResult<()> {
/// let server = SimulatedServer::demo();
/// let config = OpcUaConfig::new(server.endpoint_url());
/// let manager = SessionManager::new(config, server.transport());
///
/// manager.connect(server.endpoint_url()).await?;
/// assert_eq!(manager.state(), ConnectionState::Connected);
///
/// manager.disconnect().await?;
/// assert_eq!(manager.state(), ConnectionState::Disconnected);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Connection {
    state: ConnectionState,
    session: Option<Arc<dyn OpcUaSession>>,
}

struct ReconnectTask {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    config: OpcUaConfig,
    transport: Arc<dyn OpcUaTransport>,

    /// State and active handle, swapped together.
    connection: RwLock<Connection>,

    /// In-progress reconnect marker.
    reconnect: Mutex<Option<ReconnectTask>>,

    keep_alive: Mutex<Option<JoinHandle<()>>>,

    /// Serializes connect and disconnect.
    lifecycle: tokio::sync::Mutex<()>,

    events: broadcast::Sender<ConnectionEvent>,
    on_state_change: RwLock<Option<StateCallback>>,
    next_reconnect_id: AtomicU64,
    stats: SessionStats,
}

impl SessionManager {
    /// Creates a new session manager over `transport`.
    pub fn new(config: OpcUaConfig, transport: Arc<dyn OpcUaTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                connection: RwLock::new(Connection {
                    state: ConnectionState::Disconnected,
                    session: None,
                }),
                reconnect: Mutex::new(None),
                keep_alive: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                events,
                on_state_change: RwLock::new(None),
                next_reconnect_id: AtomicU64::new(1),
                stats: SessionStats::new(),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OpcUaConfig {
        &self.inner.config
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.read().state
    }

    /// Returns `true` if a session is active.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns `true` while a reconnect is scheduled or running.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnect.lock().is_some()
    }

    /// Returns the id of the active session.
    pub fn session_id(&self) -> Option<String> {
        self.inner
            .connection
            .read()
            .session
            .as_ref()
            .map(|s| s.session_id().to_string())
    }

    /// Returns the active session handle.
    ///
    /// Fails with `NotConnected` unless the state is `Connected`.
    pub fn session(&self) -> OpcUaResult<Arc<dyn OpcUaSession>> {
        let connection = self.inner.connection.read();
        match (&connection.state, &connection.session) {
            (ConnectionState::Connected, Some(session)) => Ok(Arc::clone(session)),
            _ => Err(OpcUaError::not_connected()),
        }
    }

    /// Returns the session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.inner.stats
    }

    /// Subscribes to connection events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Sets a callback for state changes, replacing any previous one.
    ///
    /// The callback runs on the task that caused the transition and must not
    /// block.
    pub fn set_state_change_callback<F>(&self, callback: F)
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        *self.inner.on_state_change.write() = Some(Arc::new(callback));
    }

    /// Connects to `server_address`.
    ///
    /// Any existing session is closed first. Failures are returned to the
    /// caller and are not retried; only the loss of an established session
    /// triggers automatic reconnection.
    pub async fn connect(&self, server_address: &str) -> OpcUaResult<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;

        inner.cancel_reconnect();
        inner.stop_keep_alive();
        if let Some(previous) = inner.take_session() {
            inner.close_session(previous).await;
        }

        inner.transition(ConnectionState::Connecting);
        tracing::debug!(endpoint = %server_address, "Connecting");

        let session = match inner.open(server_address).await {
            Ok(session) => session,
            Err(e) => {
                inner.stats.record_failure();
                inner.transition(ConnectionState::Disconnected);
                e.log("connect");
                return Err(e);
            }
        };

        let session_id = session.session_id().to_string();
        {
            let mut connection = inner.connection.write();
            connection.session = Some(Arc::clone(&session));
        }
        inner.transition(ConnectionState::Connected);
        inner.start_keep_alive(&session);
        inner.stats.record_connect();

        tracing::info!(
            endpoint = %server_address,
            session_id = %session_id,
            identity = %inner.config.identity.label(),
            "OPC UA session connected"
        );
        inner.emit(ConnectionEvent::Connected {
            session_id,
            endpoint: server_address.to_string(),
        });

        Ok(())
    }

    /// Disconnects.
    ///
    /// Cancels any scheduled or running reconnect before closing the session
    /// with the configured close timeout. A close failure is logged; the
    /// manager still ends up `Disconnected`. Calling this while disconnected
    /// does nothing.
    pub async fn disconnect(&self) -> OpcUaResult<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;

        let cancelled = inner.cancel_reconnect();
        inner.stop_keep_alive();

        let session = inner.take_session();
        if session.is_none() && !cancelled && self.state() == ConnectionState::Disconnected {
            return Ok(());
        }

        if let Some(session) = session {
            inner.close_session(session).await;
        }

        inner.transition(ConnectionState::Disconnected);
        inner.stats.record_disconnect();
        tracing::info!(endpoint = %inner.config.endpoint, "OPC UA session disconnected");
        inner.emit(ConnectionEvent::Disconnected);

        Ok(())
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    async fn open(&self, server_address: &str) -> OpcUaResult<Arc<dyn OpcUaSession>> {
        let endpoint = self
            .transport
            .select_endpoint(server_address)
            .await
            .map_err(|e| match e {
                OpcUaError::Connection(_) => e,
                other => OpcUaError::connection(ConnectionError::endpoint_resolution(
                    server_address,
                    other.to_string(),
                )),
            })?;

        let timeout = self.config.session_timeout;
        let opened = tokio::time::timeout(
            timeout,
            self.transport.open_session(
                &endpoint,
                &self.config.identity,
                &self.config.session_name,
                timeout,
            ),
        )
        .await
        .map_err(|_| {
            OpcUaError::connection(ConnectionError::timed_out(&endpoint.endpoint_url, timeout))
        })?;

        opened.map_err(|e| match e {
            OpcUaError::Connection(_) => e,
            other => OpcUaError::connection(ConnectionError::session_open_failed(
                &endpoint.endpoint_url,
                other.to_string(),
            )),
        })
    }

    fn take_session(&self) -> Option<Arc<dyn OpcUaSession>> {
        self.connection.write().session.take()
    }

    async fn close_session(&self, session: Arc<dyn OpcUaSession>) {
        let timeout = self.config.close_timeout;
        let session_id = session.session_id().to_string();
        match tokio::time::timeout(timeout, session.close(timeout)).await {
            Ok(Ok(())) => {
                tracing::debug!(session_id = %session_id, "Session closed");
            }
            Ok(Err(e)) => {
                OpcUaError::session(SessionError::close_failed(&session_id, e.to_string()))
                    .log("close");
            }
            Err(_) => {
                OpcUaError::session(SessionError::close_failed(
                    &session_id,
                    format!("timed out after {:?}", timeout),
                ))
                .log("close");
            }
        }
    }

    /// Sets the state and notifies the callback if it changed.
    fn transition(&self, new_state: ConnectionState) {
        let old_state = {
            let mut connection = self.connection.write();
            std::mem::replace(&mut connection.state, new_state)
        };
        self.notify_state(old_state, new_state);
    }

    fn notify_state(&self, old_state: ConnectionState, new_state: ConnectionState) {
        if old_state == new_state {
            return;
        }

        tracing::trace!(
            old_state = %old_state,
            new_state = %new_state,
            "Connection state changed"
        );

        let callback = self.on_state_change.read().clone();
        if let Some(callback) = callback {
            callback(old_state, new_state);
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn cancel_reconnect(&self) -> bool {
        match self.reconnect.lock().take() {
            Some(task) => {
                task.handle.abort();
                tracing::debug!(reconnect_id = task.id, "Reconnect cancelled");
                true
            }
            None => false,
        }
    }

    fn stop_keep_alive(&self) {
        if let Some(handle) = self.keep_alive.lock().take() {
            handle.abort();
        }
    }

    fn start_keep_alive(self: &Arc<Self>, session: &Arc<dyn OpcUaSession>) {
        let mut reports = session.keep_alive();
        let session_id = session.session_id().to_string();
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                match reports.recv().await {
                    Ok(report) => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.handle_keep_alive(&session_id, report);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(session_id = %session_id, skipped, "Keep-alive reports lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.keep_alive.lock().replace(handle) {
            previous.abort();
        }
    }

    fn handle_keep_alive(self: &Arc<Self>, session_id: &str, report: KeepAliveStatus) {
        if report.is_good() {
            return;
        }

        // Lock order: reconnect slot, then connection.
        let (failed, old_state) = {
            let mut slot = self.reconnect.lock();
            let mut connection = self.connection.write();
            let failed = match &connection.session {
                Some(session) if session.session_id() == session_id => Arc::clone(session),
                _ => return,
            };
            if connection.state == ConnectionState::Disconnected {
                return;
            }

            self.stats.record_keep_alive_failure();
            if slot.is_some() {
                tracing::debug!(
                    session_id = %session_id,
                    status = %report.status,
                    "Reconnect already in progress, ignoring keep-alive failure"
                );
                return;
            }

            let id = self.next_reconnect_id.fetch_add(1, Ordering::Relaxed);
            let handle = tokio::spawn(run_reconnect(
                Arc::downgrade(self),
                id,
                Arc::clone(&failed),
            ));
            *slot = Some(ReconnectTask { id, handle });

            let old_state = std::mem::replace(&mut connection.state, ConnectionState::Reconnecting);
            (failed, old_state)
        };

        OpcUaError::session(SessionError::keep_alive_lost(failed.session_id(), report.status))
            .log("keep-alive");
        self.notify_state(old_state, ConnectionState::Reconnecting);
    }

    fn complete_reconnect(
        self: &Arc<Self>,
        id: u64,
        session: Arc<dyn OpcUaSession>,
        attempts: u32,
    ) {
        let old_state = {
            let mut slot = self.reconnect.lock();
            match slot.as_ref() {
                Some(task) if task.id == id => {}
                _ => {
                    drop(slot);
                    tracing::debug!(
                        session_id = %session.session_id(),
                        "Discarding session from a cancelled reconnect"
                    );
                    let timeout = self.config.close_timeout;
                    tokio::spawn(async move {
                        let _ = tokio::time::timeout(timeout, session.close(timeout)).await;
                    });
                    return;
                }
            }
            *slot = None;

            let mut connection = self.connection.write();
            connection.session = Some(Arc::clone(&session));
            std::mem::replace(&mut connection.state, ConnectionState::Connected)
        };

        self.notify_state(old_state, ConnectionState::Connected);
        self.start_keep_alive(&session);
        self.stats.record_reconnect();

        let session_id = session.session_id().to_string();
        tracing::info!(
            endpoint = %self.config.endpoint,
            session_id = %session_id,
            attempts,
            "OPC UA session reconnected"
        );
        self.emit(ConnectionEvent::Reconnected {
            session_id,
            attempts,
        });
    }

    fn abandon_reconnect(&self, id: u64, attempts: u32) {
        let old_state = {
            let mut slot = self.reconnect.lock();
            if !matches!(slot.as_ref(), Some(task) if task.id == id) {
                return;
            }
            *slot = None;

            let mut connection = self.connection.write();
            connection.session = None;
            std::mem::replace(&mut connection.state, ConnectionState::Disconnected)
        };

        self.stop_keep_alive();
        self.stats.record_abandoned();
        self.notify_state(old_state, ConnectionState::Disconnected);
        OpcUaError::session(SessionError::ReconnectAbandoned { attempts }).log("reconnect");
        self.emit(ConnectionEvent::ReconnectAbandoned { attempts });
        self.emit(ConnectionEvent::Disconnected);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.reconnect.get_mut().take() {
            task.handle.abort();
        }
        if let Some(handle) = self.keep_alive.get_mut().take() {
            handle.abort();
        }
    }
}

/// Retries a lost session until it is replaced, the policy gives up, or the
/// task is aborted by `disconnect`.
async fn run_reconnect(weak: Weak<Inner>, id: u64, failed: Arc<dyn OpcUaSession>) {
    let mut attempt: u32 = 0;

    loop {
        let delay = {
            let Some(inner) = weak.upgrade() else { return };
            let policy = &inner.config.reconnect;
            if !policy.allows_attempt(attempt) {
                inner.abandon_reconnect(id, attempt);
                return;
            }
            let delay = policy.delay_for_attempt(attempt);
            inner.emit(ConnectionEvent::Reconnecting {
                attempt: attempt + 1,
                delay,
            });
            delay
        };

        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else { return };
        attempt += 1;
        inner.stats.record_reconnect_attempt();
        tracing::debug!(
            session_id = %failed.session_id(),
            attempt,
            "Attempting reconnect"
        );

        let timeout = inner.config.session_timeout;
        let transport = Arc::clone(&inner.transport);
        match tokio::time::timeout(timeout, transport.reconnect(&failed, timeout)).await {
            Ok(Ok(session)) => {
                inner.complete_reconnect(id, session, attempt);
                return;
            }
            Ok(Err(e)) => {
                OpcUaError::session(SessionError::reconnect_failed(attempt, e.to_string()))
                    .log("reconnect");
            }
            Err(_) => {
                OpcUaError::session(SessionError::reconnect_failed(
                    attempt,
                    format!("timed out after {:?}", timeout),
                ))
                .log("reconnect");
            }
        }
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for session operations.
#[derive(Debug)]
pub struct SessionStats {
    connects: AtomicU64,
    disconnects: AtomicU64,
    failures: AtomicU64,
    keep_alive_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects: AtomicU64,
    abandoned: AtomicU64,
}

impl SessionStats {
    /// Creates new session statistics.
    pub fn new() -> Self {
        Self {
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            keep_alive_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_keep_alive_failure(&self) {
        self.keep_alive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of successful connects.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Returns the number of disconnects.
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Returns the number of failed connects.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns the number of bad keep-alive reports for the active session.
    pub fn keep_alive_failures(&self) -> u64 {
        self.keep_alive_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of reconnect attempts.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Returns the number of successful reconnects.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Returns the number of abandoned reconnects.
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.connects,
            &self.disconnects,
            &self.failures,
            &self.keep_alive_failures,
            &self.reconnect_attempts,
            &self.reconnects,
            &self.abandoned,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReconnectPolicy;
    use crate::simulation::SimulatedServer;
    use crate::types::StatusCode;

    fn manager(server: &SimulatedServer, policy: ReconnectPolicy) -> SessionManager {
        let config = OpcUaConfig::builder()
            .endpoint(server.endpoint_url())
            .reconnect(policy)
            .build()
            .unwrap();
        SessionManager::new(config, server.transport())
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Reconnecting.is_transitioning());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let server = SimulatedServer::demo();
        let manager = manager(&server, ReconnectPolicy::default());
        let mut events = manager.subscribe_events();

        manager.connect(server.endpoint_url()).await.unwrap();
        assert!(manager.is_connected());
        assert!(manager.session().is_ok());
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::Connected { .. }
        ));

        manager.disconnect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_reconnecting());
        assert!(manager.session().is_err());
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let server = SimulatedServer::demo();
        let manager = manager(&server, ReconnectPolicy::default());
        manager.disconnect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.stats().disconnects(), 0);
    }

    #[tokio::test]
    async fn test_connect_closes_previous_session() {
        let server = SimulatedServer::demo();
        let manager = manager(&server, ReconnectPolicy::default());

        manager.connect(server.endpoint_url()).await.unwrap();
        let first = manager.session_id().unwrap();
        manager.connect(server.endpoint_url()).await.unwrap();
        let second = manager.session_id().unwrap();

        assert_ne!(first, second);
        assert_eq!(server.close_count(), 1);
        assert_eq!(manager.stats().connects(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_retried() {
        let server = SimulatedServer::demo();
        server.set_fail_open(true);
        let manager = manager(&server, ReconnectPolicy::default());

        let err = manager.connect(server.endpoint_url()).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_reconnecting());
        assert_eq!(manager.stats().failures(), 1);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_fails_resolution() {
        let server = SimulatedServer::demo();
        let manager = manager(&server, ReconnectPolicy::default());
        let err = manager.connect("opc.tcp://elsewhere:4840").await.unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Connection(ConnectionError::EndpointResolution { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_callback_sees_transitions() {
        let server = SimulatedServer::demo();
        let manager = manager(&server, ReconnectPolicy::fixed(Duration::from_secs(1)));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.set_state_change_callback(move |_, new| sink.lock().push(new));

        manager.connect(server.endpoint_url()).await.unwrap();
        server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
        tokio::time::sleep(Duration::from_secs(2)).await;
        manager.disconnect().await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_abandoned_after_max_attempts() {
        let server = SimulatedServer::demo();
        let manager = manager(
            &server,
            ReconnectPolicy::fixed(Duration::from_secs(1)).with_max_attempts(2),
        );
        let mut events = manager.subscribe_events();

        manager.connect(server.endpoint_url()).await.unwrap();
        server.set_reconnect_failures(u32::MAX);
        server.fail_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);

        let mut abandoned = None;
        while let Ok(event) = events.recv().await {
            if let ConnectionEvent::ReconnectAbandoned { attempts } = event {
                abandoned = Some(attempts);
                break;
            }
        }

        assert_eq!(abandoned, Some(2));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.stats().reconnect_attempts(), 2);
        assert!(!manager.is_reconnecting());
    }

    #[test]
    fn test_session_stats_reset() {
        let stats = SessionStats::new();
        stats.record_connect();
        stats.record_reconnect_attempt();
        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.reconnect_attempts(), 1);
        stats.reset();
        assert_eq!(stats.connects(), 0);
    }
}
