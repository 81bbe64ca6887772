// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client core.
//!
//! This crate keeps one session to an OPC UA server alive and builds the
//! everyday client operations on top of it:
//!
//! - Session lifecycle with keep-alive driven, policy-controlled reconnect
//! - Address-space browsing across continuation-point pages
//! - Single and batch value read/write, blocking or pending
//! - A keyed registry of data-change subscriptions
//!
//! The wire protocol sits behind the [`client::OpcUaTransport`] and
//! [`client::OpcUaSession`] traits. The [`simulation`] module provides an
//! in-memory server implementing both, used by the tests and the CLI.
//!
//! # Error Handling
//!
//! This crate provides a comprehensive error hierarchy through the [`error`] module:
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint resolution and session open failures
//! ├── Session       - Keep-alive loss and reconnect exhaustion
//! ├── Browse        - Transport failures during browse
//! ├── Operation     - Read/write failures and batch validation
//! ├── Subscription  - Subscription create/delete failures
//! ├── Conversion    - Text ↔ value conversion errors
//! ├── Configuration - Invalid settings
//! └── Timeout       - Operations exceeding their bound
//! ```
//!
//! # Example
//!
//! ```
//! use bhs_opcua::{NodeId, OpcUaClient, OpcUaConfig, OpcUaValue};
//! use bhs_opcua::simulation::SimulatedServer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> bhs_opcua::OpcUaResult<()> {
//! let server = SimulatedServer::demo();
//! let client = OpcUaClient::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
//! client.connect().await?;
//!
//! let var_x = NodeId::string(2, "FolderA.VarX");
//! assert_eq!(client.values().read_value(&var_x).await?.value, OpcUaValue::Int32(42));
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod browse;
pub mod client;
pub mod error;
pub mod simulation;
pub mod types;

// Re-export commonly used types
pub use error::{
    BrowseError, ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity,
    OpcUaError, OpcUaResult, OperationError, SessionError, SubscriptionError, TimeoutError,
};

pub use types::{
    AccessLevel, AttributeId, BrowseDirection, ExpandedNodeId, NodeClass, NodeId, NodeIdentifier,
    OpcUaConfig, OpcUaConfigBuilder, OpcUaDataType, QualifiedName, StatusCode,
    SubscriptionSettings, UserIdentity,
};

// Re-export client types
pub use client::{
    ConnectionEvent, ConnectionState, DataValue, NodeAttributes, OpcUaClient, OpcUaSession,
    OpcUaTransport, OpcUaValue, PendingOperation, ReconnectPolicy, ReferenceDescription,
    RetryStrategy, SessionManager, SessionStats, ValueAccess,
};

// Re-export subscription types
pub use client::{
    ChannelCallback, ItemNotification, MonitoredItem, MonitoredItemSpec, NotificationCallback,
    SubscriptionInfo, SubscriptionRegistry,
};

// Re-export browse types
pub use browse::{AddressSpaceBrowser, BrowseEntry, BrowseOptions, BrowseStatistics};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
