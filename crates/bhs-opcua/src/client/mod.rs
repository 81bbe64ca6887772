// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client components.
//!
//! - **Transport Layer**: the traits a wire implementation provides
//! - **Session Management**: connect, keep-alive driven reconnect, disconnect
//! - **Value Access**: single and batch read/write, blocking or pending
//! - **Subscriptions**: keyed registry of monitored-item groups
//! - **Client Wrapper**: one facade over all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        OpcUaClient                              │
//! │            (browse / read / write / subscribe facade)           │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────────────┐
//! │ AddressSpace-   │ │  ValueAccess    │ │  SubscriptionRegistry   │
//! │ Browser         │ │                 │ │                         │
//! └─────────────────┘ └─────────────────┘ └─────────────────────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SessionManager                             │
//! │     (owns the active session handle, swaps it on reconnect)     │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                OpcUaTransport / OpcUaSession                    │
//! │                  (abstract transport layer)                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Components never hold the session handle themselves. Each request asks
//! the [`SessionManager`] for the current handle, so a reconnect swap is
//! seen by every component at once.

mod access;
pub mod conversion;
mod retry;
mod session;
pub mod subscription;
pub mod transport;
mod wrapper;

pub use access::{NodeAttributes, PendingOperation, ValueAccess};
pub use retry::{ReconnectPolicy, RetryStrategy};
pub use session::{ConnectionEvent, ConnectionState, SessionManager, SessionStats};
pub use subscription::{
    ChannelCallback, ItemNotification, MonitoredItem, MonitoredItemSpec, NotificationCallback,
    RegistryStatistics, SubscriptionInfo, SubscriptionRegistry,
};
pub use transport::{
    BrowseDescription, BrowseResult, ContinuationPoint, DataChangeNotification, DataValue,
    EndpointDescription, KeepAliveStatus, OpcUaSession, OpcUaTransport, OpcUaValue,
    ReadValueId, ReferenceDescription, WriteValue,
};
pub use wrapper::OpcUaClient;
