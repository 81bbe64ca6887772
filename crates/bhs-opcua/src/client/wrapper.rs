// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! High-level OPC UA client.
//!
//! [`OpcUaClient`] bundles the session manager, browser, value access and
//! subscription registry over one shared session.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::browse::AddressSpaceBrowser;
use crate::error::OpcUaResult;
use crate::types::{NodeId, OpcUaConfig};

use super::access::ValueAccess;
use super::conversion::parse_like;
use super::session::{ConnectionEvent, ConnectionState, SessionManager};
use super::subscription::SubscriptionRegistry;
use super::transport::{DataValue, OpcUaTransport, OpcUaValue};

/// High-level OPC UA client.
///
/// # Examples
///
/// ```
/// use bhs_opcua::client::{OpcUaClient, OpcUaValue};
/// use bhs_opcua::simulation::SimulatedServer;
/// use bhs_opcua::types::{NodeId, OpcUaConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> bhs_opcua::OpcUaResult<()> {
/// let server = SimulatedServer::demo();
/// let client = OpcUaClient::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
/// client.connect().await?;
///
/// let children = client.browser().browse_children(&NodeId::OBJECTS_FOLDER).await?;
/// assert_eq!(children[0].display_name, "FolderA");
///
/// client.write_text(&NodeId::string(2, "FolderA.VarX"), "100").await?;
/// let value = client.read("ns=2;s=FolderA.VarX").await?;
/// assert_eq!(value.value, OpcUaValue::Int32(100));
///
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpcUaClient {
    session: SessionManager,
    browser: AddressSpaceBrowser,
    values: ValueAccess,
    subscriptions: SubscriptionRegistry,
}

impl OpcUaClient {
    /// Creates a client over `transport`.
    pub fn new(config: OpcUaConfig, transport: Arc<dyn OpcUaTransport>) -> Self {
        let session = SessionManager::new(config, transport);
        Self {
            browser: AddressSpaceBrowser::new(session.clone()),
            values: ValueAccess::new(session.clone()),
            subscriptions: SubscriptionRegistry::new(session.clone()),
            session,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OpcUaConfig {
        self.session.config()
    }

    /// Returns the session manager.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Returns the address-space browser.
    pub fn browser(&self) -> &AddressSpaceBrowser {
        &self.browser
    }

    /// Returns the value access layer.
    pub fn values(&self) -> &ValueAccess {
        &self.values
    }

    /// Returns the subscription registry.
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Returns `true` while a session is established.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Subscribes to connection events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.session.subscribe_events()
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Connects to the configured endpoint.
    pub async fn connect(&self) -> OpcUaResult<()> {
        let endpoint = self.session.config().endpoint.clone();
        self.session.connect(&endpoint).await
    }

    /// Connects to `server_address` instead of the configured endpoint.
    pub async fn connect_to(&self, server_address: &str) -> OpcUaResult<()> {
        self.session.connect(server_address).await
    }

    /// Removes all subscriptions and closes the session.
    pub async fn disconnect(&self) -> OpcUaResult<()> {
        if let Err(e) = self.subscriptions.unsubscribe_all().await {
            e.log("disconnect");
        }
        self.session.disconnect().await
    }

    // =========================================================================
    // Shortcuts
    // =========================================================================

    /// Reads the value of a node given as text, e.g. `ns=2;s=Temperature`.
    pub async fn read(&self, node_id: &str) -> OpcUaResult<DataValue> {
        let node = NodeId::from_str(node_id)?;
        self.values.read_value(&node).await
    }

    /// Writes `text` to `node_id`, parsed as the kind the node holds now.
    ///
    /// Returns the value that was written.
    pub async fn write_text(&self, node_id: &NodeId, text: &str) -> OpcUaResult<OpcUaValue> {
        let current = self.values.read_value(node_id).await?;
        let value = parse_like(text, &current.value)?;
        self.values.write_value(node_id, value.clone()).await?;
        Ok(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
