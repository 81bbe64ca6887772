// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport abstraction for OPC UA communication.
//!
//! The client core never touches the wire. It consumes two traits:
//!
//! - [`OpcUaTransport`]: resolves an endpoint and opens (or reopens) sessions
//! - [`OpcUaSession`]: one live session exchanging service requests
//!
//! Request and response shapes mirror the OPC UA services they stand for,
//! trimmed to the fields the client actually interprets.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use crate::error::OpcUaResult;
use crate::types::{
    AttributeId, BrowseDirection, ExpandedNodeId, NodeClass, NodeId, OpcUaDataType,
    QualifiedName, StatusCode, UserIdentity,
};

// =============================================================================
// Well-known reference types
// =============================================================================

/// `Aggregates` reference type (`i=44`).
pub const AGGREGATES: NodeId = NodeId::numeric(0, 44);

/// `Organizes` reference type (`i=35`).
pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);

/// `HierarchicalReferences` reference type (`i=33`).
pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);

/// Browse result mask selecting every field of a reference description.
pub const RESULT_MASK_ALL: u32 = 0x3F;

// =============================================================================
// EndpointDescription
// =============================================================================

/// The endpoint a session is opened against.
///
/// Security negotiation happens inside the transport; the client only carries
/// the description through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: String,

    /// Security policy URI.
    pub security_policy_uri: String,

    /// Security mode name.
    pub security_mode: String,

    /// Server application name.
    pub server_name: String,
}

impl EndpointDescription {
    /// Creates an unsecured endpoint description for `url`.
    pub fn unsecured(url: impl Into<String>) -> Self {
        Self {
            endpoint_url: url.into(),
            security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#None".to_string(),
            security_mode: "None".to_string(),
            server_name: String::new(),
        }
    }
}

// =============================================================================
// KeepAliveStatus
// =============================================================================

/// A session health report delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAliveStatus {
    /// Session the report belongs to.
    pub session_id: String,

    /// Health status; anything but good means the session was lost.
    pub status: StatusCode,

    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
}

impl KeepAliveStatus {
    /// Creates a report stamped with the current time.
    pub fn new(session_id: impl Into<String>, status: StatusCode) -> Self {
        Self {
            session_id: session_id.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` if the session is healthy.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }
}

// =============================================================================
// Browse service types
// =============================================================================

/// One browse request.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseDescription {
    /// Node whose references are followed.
    pub node_id: NodeId,

    /// Direction of references to follow.
    pub direction: BrowseDirection,

    /// Reference type filter.
    pub reference_type_id: NodeId,

    /// Whether subtypes of the reference type match.
    pub include_subtypes: bool,

    /// Node class mask (0 or `NodeClass::ALL_MASK` selects every class).
    pub node_class_mask: u32,

    /// Which reference description fields to return.
    pub result_mask: u32,
}

impl BrowseDescription {
    /// Creates a forward request for `reference_type_id` returning everything.
    pub fn forward(node_id: NodeId, reference_type_id: NodeId) -> Self {
        Self {
            node_id,
            direction: BrowseDirection::Forward,
            reference_type_id,
            include_subtypes: true,
            node_class_mask: NodeClass::ALL_MASK,
            result_mask: RESULT_MASK_ALL,
        }
    }
}

/// Opaque marker used to fetch the next page of a browse result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationPoint(pub Vec<u8>);

impl ContinuationPoint {
    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ContinuationPoint {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A reference returned by browse.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDescription {
    /// Reference type.
    pub reference_type_id: NodeId,

    /// Whether the reference is forward.
    pub is_forward: bool,

    /// Target node.
    pub node_id: ExpandedNodeId,

    /// Browse name of the target.
    pub browse_name: QualifiedName,

    /// Display name of the target.
    pub display_name: String,

    /// Node class of the target.
    pub node_class: NodeClass,

    /// Type definition of the target, if any.
    pub type_definition: Option<ExpandedNodeId>,
}

/// Result of one browse or browse-next request.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseResult {
    /// Per-request status.
    pub status: StatusCode,

    /// Present when more references remain beyond this page.
    pub continuation_point: Option<ContinuationPoint>,

    /// References in this page.
    pub references: Vec<ReferenceDescription>,
}

impl BrowseResult {
    /// Creates a failed result carrying only a status.
    pub fn failed(status: StatusCode) -> Self {
        Self {
            status,
            continuation_point: None,
            references: Vec::new(),
        }
    }
}

// =============================================================================
// Read / Write service types
// =============================================================================

/// One item to read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadValueId {
    /// Node to read.
    pub node_id: NodeId,

    /// Attribute to read.
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    /// Reads the value attribute of `node_id`.
    pub fn value(node_id: NodeId) -> Self {
        Self::attribute(node_id, AttributeId::Value)
    }

    /// Reads `attribute_id` of `node_id`.
    pub fn attribute(node_id: NodeId, attribute_id: AttributeId) -> Self {
        Self {
            node_id,
            attribute_id,
        }
    }
}

/// OPC UA value exchanged with the client.
///
/// Variable values cross the boundary in the primitive kinds below. `Byte`
/// only appears when reading metadata attributes such as `AccessLevel`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),

    /// Unsigned byte (attribute values).
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 32-bit float.
    Float(f32),

    /// String value.
    String(String),

    /// Date/time value.
    DateTime(DateTime<Utc>),

    /// No value.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns the data type of this value, or `None` for null and bytes.
    pub fn data_type(&self) -> Option<OpcUaDataType> {
        match self {
            Self::Boolean(_) => Some(OpcUaDataType::Boolean),
            Self::Int16(_) => Some(OpcUaDataType::Int16),
            Self::UInt16(_) => Some(OpcUaDataType::UInt16),
            Self::Int32(_) => Some(OpcUaDataType::Int32),
            Self::UInt32(_) => Some(OpcUaDataType::UInt32),
            Self::Float(_) => Some(OpcUaDataType::Float),
            Self::String(_) => Some(OpcUaDataType::String),
            Self::DateTime(_) => Some(OpcUaDataType::DateTime),
            Self::Byte(_) | Self::Null => None,
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Byte(v) => Some(*v != 0),
            Self::Int16(v) => Some(*v != 0),
            Self::UInt16(v) => Some(*v != 0),
            Self::Int32(v) => Some(*v != 0),
            Self::UInt32(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Attempts to get the value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Attempts to get the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to get the value as a byte.
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Self::Byte(v) => Some(*v),
            Self::UInt16(v) => u8::try_from(*v).ok(),
            Self::Int32(v) => u8::try_from(*v).ok(),
            Self::UInt32(v) => u8::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Null => write!(f, "null"),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for OpcUaValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Boolean,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    f32 => Float,
    String => String,
    DateTime<Utc> => DateTime,
}

impl From<&str> for OpcUaValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// A value with status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value.
    pub value: OpcUaValue,

    /// Status of the value.
    pub status: StatusCode,

    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Timestamp assigned by the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value without timestamps.
    pub fn good(value: impl Into<OpcUaValue>) -> Self {
        Self {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Creates a value-less result carrying only a status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: OpcUaValue::Null,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }

    /// Returns `true` if the status is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.status.is_bad()
    }
}

/// One item to write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteValue {
    /// Node to write.
    pub node_id: NodeId,

    /// Attribute to write.
    pub attribute_id: AttributeId,

    /// The value to write.
    pub value: DataValue,
}

impl WriteValue {
    /// Writes `value` to the value attribute with good status and no
    /// timestamps, leaving timestamp assignment to the server.
    pub fn value(node_id: NodeId, value: OpcUaValue) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
            value: DataValue::good(value),
        }
    }
}

// =============================================================================
// Subscription service types
// =============================================================================

/// Parameters of a subscription container.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionParameters {
    /// Display name of the container.
    pub display_name: String,

    /// Publishing interval.
    pub publishing_interval: Duration,

    /// Lifetime count.
    pub lifetime_count: u32,

    /// Keep-alive count.
    pub keepalive_count: u32,

    /// Maximum notifications per publish.
    pub max_notifications_per_publish: u32,

    /// Priority.
    pub priority: u8,

    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
}

/// One monitored item to create.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemRequest {
    /// Handle echoed back in every notification for this item.
    pub client_handle: u32,

    /// Node to monitor.
    pub node_id: NodeId,

    /// Attribute to monitor.
    pub attribute_id: AttributeId,

    /// Sampling interval.
    pub sampling_interval: Duration,

    /// Queue size.
    pub queue_size: u32,

    /// Whether the oldest queued value is discarded on overflow.
    pub discard_oldest: bool,

    /// Display name.
    pub display_name: String,
}

/// Result of creating one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemResult {
    /// Per-item status.
    pub status: StatusCode,

    /// Server-assigned id.
    pub monitored_item_id: u32,

    /// Sampling interval the server settled on.
    pub revised_sampling_interval: Duration,
}

/// A data change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeNotification {
    /// Subscription the change belongs to.
    pub subscription_id: u32,

    /// Client handle of the monitored item.
    pub client_handle: u32,

    /// The new value.
    pub value: DataValue,
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Opens sessions against a server.
///
/// Implementations handle wire encoding and security negotiation.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow concurrent access
/// from multiple tasks.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Resolves one usable endpoint for `url`.
    async fn select_endpoint(&self, url: &str) -> OpcUaResult<EndpointDescription>;

    /// Opens a session, failing if it is not established within `timeout`.
    async fn open_session(
        &self,
        endpoint: &EndpointDescription,
        identity: &UserIdentity,
        session_name: &str,
        timeout: Duration,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>>;

    /// Re-establishes a lost session.
    ///
    /// Returns a new handle; the previous handle is considered torn down.
    async fn reconnect(
        &self,
        previous: &Arc<dyn OpcUaSession>,
        timeout: Duration,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>>;
}

// =============================================================================
// OpcUaSession Trait
// =============================================================================

/// One live session.
///
/// Service calls return `Err` only when the exchange itself failed.
/// Per-item failures are reported through the statuses in the response.
#[async_trait]
pub trait OpcUaSession: Send + Sync {
    /// Server-assigned session id.
    fn session_id(&self) -> &str;

    /// Endpoint the session was opened against.
    fn endpoint(&self) -> &EndpointDescription;

    /// Subscribes to this session's health reports.
    fn keep_alive(&self) -> broadcast::Receiver<KeepAliveStatus>;

    /// Closes the session, giving up after `timeout`.
    async fn close(&self, timeout: Duration) -> OpcUaResult<()>;

    /// Browse service.
    async fn browse(&self, requests: &[BrowseDescription]) -> OpcUaResult<Vec<BrowseResult>>;

    /// BrowseNext service. `release` frees the points without fetching.
    async fn browse_next(
        &self,
        release: bool,
        continuation_points: &[ContinuationPoint],
    ) -> OpcUaResult<Vec<BrowseResult>>;

    /// Read service. Results are positional.
    async fn read(&self, items: &[ReadValueId]) -> OpcUaResult<Vec<DataValue>>;

    /// Write service. Results are positional.
    async fn write(&self, items: &[WriteValue]) -> OpcUaResult<Vec<StatusCode>>;

    /// Creates a subscription container; changes are pushed to `notifications`.
    async fn create_subscription(
        &self,
        parameters: &SubscriptionParameters,
        notifications: mpsc::UnboundedSender<DataChangeNotification>,
    ) -> OpcUaResult<u32>;

    /// Adds monitored items to a subscription. Results are positional.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>>;

    /// Deletes a subscription container and its monitored items.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;
}

impl fmt::Debug for dyn OpcUaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcUaSession")
            .field("session_id", &self.session_id())
            .field("endpoint", &self.endpoint().endpoint_url)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_browse_description() {
        let desc = BrowseDescription::forward(NodeId::OBJECTS_FOLDER, AGGREGATES);
        assert_eq!(desc.direction, BrowseDirection::Forward);
        assert_eq!(desc.node_class_mask, 0xFF);
        assert_eq!(desc.result_mask, 0x3F);
        assert!(desc.include_subtypes);
        assert_eq!(desc.reference_type_id, NodeId::numeric(0, 44));
        assert_eq!(ORGANIZES, NodeId::numeric(0, 35));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(OpcUaValue::Int32(42).as_i64(), Some(42));
        assert_eq!(OpcUaValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(OpcUaValue::from("hi").as_str(), Some("hi"));
        assert_eq!(OpcUaValue::Byte(3).as_byte(), Some(3));
        assert_eq!(OpcUaValue::Int32(300).as_byte(), None);
        assert!(OpcUaValue::Null.is_null());
        assert_eq!(OpcUaValue::Int16(-1).data_type(), Some(OpcUaDataType::Int16));
        assert_eq!(OpcUaValue::Null.data_type(), None);
    }

    #[test]
    fn test_write_value_has_no_timestamps() {
        let write = WriteValue::value(NodeId::string(2, "X"), OpcUaValue::Int32(1));
        assert_eq!(write.attribute_id, AttributeId::Value);
        assert!(write.value.is_good());
        assert!(write.value.source_timestamp.is_none());
        assert!(write.value.server_timestamp.is_none());
    }

    #[test]
    fn test_data_value_status() {
        assert!(DataValue::good(1u32).is_good());
        let bad = DataValue::bad(StatusCode::BAD_NOT_READABLE);
        assert!(bad.is_bad());
        assert!(bad.value.is_null());
    }
}
