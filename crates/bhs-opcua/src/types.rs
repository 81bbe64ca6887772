// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA value and configuration types.
//!
//! This module provides the types shared by every client component:
//!
//! - **NodeId / ExpandedNodeId**: Structural node identifiers with parsing
//! - **StatusCode**: Per-item and service-level result codes
//! - **NodeClass / AttributeId / AccessLevel**: Address-space metadata
//! - **OpcUaDataType**: The primitive kinds values are exchanged in
//! - **OpcUaConfig**: Client configuration with builder
//! - **SubscriptionSettings**: Defaults for subscription containers
//!
//! # Examples
//!
//! ```
//! use bhs_opcua::types::{NodeId, OpcUaConfig};
//!
//! let node_id: NodeId = "ns=2;s=Line1.Speed".parse().unwrap();
//! assert_eq!(node_id, NodeId::string(2, "Line1.Speed"));
//!
//! let config = OpcUaConfig::builder()
//!     .endpoint("opc.tcp://localhost:4840")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.reconnect.delay.as_secs(), 10);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::browse::BrowseOptions;
use crate::client::ReconnectPolicy;
use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// Equality and hashing are structural: two ids are equal when namespace and
/// identifier are equal, regardless of where they came from.
///
/// # Examples
///
/// ```
/// use bhs_opcua::types::NodeId;
///
/// let numeric = NodeId::numeric(0, 85);
/// assert_eq!(numeric, NodeId::OBJECTS_FOLDER);
/// assert_eq!(numeric.to_string(), "i=85");
///
/// let parsed: NodeId = "ns=2;s=Tank.Level".parse().unwrap();
/// assert_eq!(parsed.namespace_index, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// The root folder of the address space (`i=84`).
    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);

    /// The Objects folder (`i=85`).
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);

    /// The Types folder (`i=86`).
    pub const TYPES_FOLDER: NodeId = NodeId::numeric(0, 86);

    /// The Views folder (`i=87`).
    pub const VIEWS_FOLDER: NodeId = NodeId::numeric(0, 87);

    /// Creates a numeric node ID.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value.into()),
        }
    }

    /// Returns the null node ID (`i=0`).
    #[inline]
    pub const fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// Returns `true` if this is the null node ID.
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && self.identifier == NodeIdentifier::Numeric(0)
    }

    /// Returns the OPC UA string form, omitting `ns=0;`.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=85` (namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            OpcUaError::configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".into()))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".into()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("Invalid numeric identifier".into()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid("Empty string identifier".into()));
            }
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {}", e)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("Invalid base64: {}", e)))?,
            )
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s=, g=, or b=".into(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// ExpandedNodeId
// =============================================================================

/// A node identifier that may point outside the local server.
///
/// Browse results carry expanded ids. An id is *absolute* when it names a
/// namespace URI or a remote server; such targets cannot be browsed further
/// through the current session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// The node id within its namespace.
    pub node_id: NodeId,

    /// Namespace URI, when the namespace is given by URI instead of index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_uri: Option<String>,

    /// Server index (0 = local server).
    #[serde(default)]
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Creates an absolute id referring to another server.
    pub fn remote(node_id: NodeId, namespace_uri: impl Into<String>, server_index: u32) -> Self {
        Self {
            node_id,
            namespace_uri: Some(namespace_uri.into()),
            server_index,
        }
    }

    /// Returns `true` if this id cannot be resolved to a local node.
    #[inline]
    pub fn is_absolute(&self) -> bool {
        self.namespace_uri.is_some() || self.server_index != 0
    }

    /// Returns the local node id, or `None` for absolute ids.
    pub fn to_local(&self) -> Option<&NodeId> {
        if self.is_absolute() {
            None
        } else {
            Some(&self.node_id)
        }
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_index != 0 {
            write!(f, "svr={};", self.server_index)?;
        }
        match &self.namespace_uri {
            Some(uri) => write!(f, "nsu={};{}", uri, self.node_id.identifier),
            None => write!(f, "{}", self.node_id),
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// The top two bits carry the severity: `00` good, `01` uncertain,
/// `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Uncertain, no specific reason.
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    /// Bad, no specific reason.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// An internal error occurred.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// A low level communication error occurred.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// The server has shut down.
    pub const BAD_SHUTDOWN: StatusCode = StatusCode(0x800C_0000);
    /// The client lost its connection to the server.
    pub const BAD_SERVER_NOT_CONNECTED: StatusCode = StatusCode(0x800D_0000);
    /// There was nothing to do because the request had no operations.
    pub const BAD_NOTHING_TO_DO: StatusCode = StatusCode(0x800F_0000);
    /// The request had too many operations.
    pub const BAD_TOO_MANY_OPERATIONS: StatusCode = StatusCode(0x8010_0000);
    /// The session id is not valid.
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    /// The session was closed by the client.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    /// The node id refers to a node that does not exist.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// The attribute is not supported for the node.
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    /// The access level does not allow reading.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    /// The access level does not allow writing.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    /// The continuation point is no longer valid.
    pub const BAD_CONTINUATION_POINT_INVALID: StatusCode = StatusCode(0x804A_0000);
    /// No continuation points are available to the session.
    pub const BAD_NO_CONTINUATION_POINTS: StatusCode = StatusCode(0x804B_0000);
    /// The value supplied does not match the node's data type.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    /// The server has reached its subscription limit.
    pub const BAD_TOO_MANY_SUBSCRIPTIONS: StatusCode = StatusCode(0x8077_0000);
    /// The variable should receive its value from another variable.
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);
    /// The network connection has been closed.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the severity is uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the severity is bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns `true` for codes that describe a transient condition.
    pub fn is_transient(&self) -> bool {
        matches!(
            *self,
            Self::BAD_TIMEOUT
                | Self::BAD_COMMUNICATION_ERROR
                | Self::BAD_SERVER_NOT_CONNECTED
                | Self::BAD_CONNECTION_CLOSED
                | Self::BAD_TOO_MANY_OPERATIONS
                | Self::BAD_NO_CONTINUATION_POINTS
        )
    }

    /// Returns the symbolic name of the code, ignoring the info bits.
    pub fn name(&self) -> &'static str {
        match Self(self.0 & 0xFFFF_0000) {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD => "Bad",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SHUTDOWN => "BadShutdown",
            Self::BAD_SERVER_NOT_CONNECTED => "BadServerNotConnected",
            Self::BAD_NOTHING_TO_DO => "BadNothingToDo",
            Self::BAD_TOO_MANY_OPERATIONS => "BadTooManyOperations",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_CONTINUATION_POINT_INVALID => "BadContinuationPointInvalid",
            Self::BAD_NO_CONTINUATION_POINTS => "BadNoContinuationPoints",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_TOO_MANY_SUBSCRIPTIONS => "BadTooManySubscriptions",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_CONNECTION_CLOSED => "BadConnectionClosed",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010X})", self.name(), self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

// =============================================================================
// QualifiedName
// =============================================================================

/// A name qualified by a namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// The name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

// =============================================================================
// OpcUaDataType
// =============================================================================

/// The primitive kinds values cross the client boundary in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpcUaDataType {
    /// Boolean.
    Boolean,
    /// 16-bit signed integer.
    Int16,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit signed integer.
    Int32,
    /// 32-bit unsigned integer.
    UInt32,
    /// 32-bit float.
    Float,
    /// String.
    String,
    /// Date/time.
    DateTime,
}

impl OpcUaDataType {
    /// Returns the OPC UA built-in type id.
    pub const fn builtin_id(&self) -> u32 {
        match self {
            Self::Boolean => 1,
            Self::Int16 => 4,
            Self::UInt16 => 5,
            Self::Int32 => 6,
            Self::UInt32 => 7,
            Self::Float => 10,
            Self::String => 12,
            Self::DateTime => 13,
        }
    }

    /// Returns the type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Float => "Float",
            Self::String => "String",
            Self::DateTime => "DateTime",
        }
    }
}

impl fmt::Display for OpcUaDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpcUaDataType {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(Self::Boolean),
            "int16" => Ok(Self::Int16),
            "uint16" => Ok(Self::UInt16),
            "int32" => Ok(Self::Int32),
            "uint32" => Ok(Self::UInt32),
            "float" => Ok(Self::Float),
            "string" => Ok(Self::String),
            "datetime" => Ok(Self::DateTime),
            _ => Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "data_type",
                format!("Unknown data type '{}'", s),
            ))),
        }
    }
}

// =============================================================================
// BrowseDirection
// =============================================================================

/// OPC UA browse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Browse forward references.
    #[default]
    Forward,

    /// Browse inverse references.
    Inverse,

    /// Browse both forward and inverse references.
    Both,
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Mask selecting every node class.
    pub const ALL_MASK: u32 = 0xFF;

    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from OPC UA value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Returns `true` if `mask` selects this node class.
    #[inline]
    pub const fn matches(&self, mask: u32) -> bool {
        mask == 0 || mask & self.value() != 0
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Object => "Object",
            Self::Variable => "Variable",
            Self::Method => "Method",
            Self::ObjectType => "ObjectType",
            Self::VariableType => "VariableType",
            Self::ReferenceType => "ReferenceType",
            Self::DataType => "DataType",
            Self::View => "View",
        };
        f.write_str(name)
    }
}

// =============================================================================
// AttributeId
// =============================================================================

/// OPC UA attribute IDs used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Value attribute.
    #[default]
    Value,
    /// Data type attribute.
    DataType,
    /// Access level attribute.
    AccessLevel,
    /// User access level attribute.
    UserAccessLevel,
}

impl AttributeId {
    /// Returns the OPC UA numeric value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::Value => 13,
            Self::DataType => 14,
            Self::AccessLevel => 17,
            Self::UserAccessLevel => 18,
        }
    }
}

// =============================================================================
// AccessLevel
// =============================================================================

/// Access level bitmask of a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(pub u8);

impl AccessLevel {
    /// No access.
    pub const NONE: AccessLevel = AccessLevel(0);
    /// The current value is readable.
    pub const CURRENT_READ: AccessLevel = AccessLevel(1);
    /// The current value is writable.
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(2);
    /// History is readable.
    pub const HISTORY_READ: AccessLevel = AccessLevel(4);
    /// History is writable.
    pub const HISTORY_WRITE: AccessLevel = AccessLevel(8);
    /// The variable generates semantic change events.
    pub const SEMANTIC_CHANGE: AccessLevel = AccessLevel(16);
    /// The status code is writable.
    pub const STATUS_WRITE: AccessLevel = AccessLevel(32);
    /// The timestamps are writable.
    pub const TIMESTAMP_WRITE: AccessLevel = AccessLevel(64);

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    pub const fn contains(&self, other: AccessLevel) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the current value may be written.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        self.contains(Self::CURRENT_WRITE)
    }

    /// Returns `true` if the current value may be read.
    #[inline]
    pub const fn is_readable(&self) -> bool {
        self.contains(Self::CURRENT_READ)
    }

    /// Returns a human-readable description of the bitmask.
    pub fn description(&self) -> String {
        if self.0 == 0 {
            return "None".to_string();
        }

        let mut parts = Vec::new();
        match self.0 & 0x03 {
            0x01 => parts.push("CurrentRead"),
            0x02 => parts.push("CurrentWrite"),
            0x03 => parts.push("CurrentReadOrWrite"),
            _ => {}
        }
        match self.0 & 0x0C {
            0x04 => parts.push("HistoryRead"),
            0x08 => parts.push("HistoryWrite"),
            0x0C => parts.push("HistoryReadOrWrite"),
            _ => {}
        }
        if self.contains(Self::SEMANTIC_CHANGE) {
            parts.push("SemanticChange");
        }
        if self.contains(Self::STATUS_WRITE) {
            parts.push("StatusWrite");
        }
        if self.contains(Self::TIMESTAMP_WRITE) {
            parts.push("TimestampWrite");
        }
        parts.join(" | ")
    }
}

impl std::ops::BitOr for AccessLevel {
    type Output = AccessLevel;

    fn bitor(self, rhs: Self) -> Self::Output {
        AccessLevel(self.0 | rhs.0)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

// =============================================================================
// UserIdentity
// =============================================================================

/// User identity presented when opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserIdentity {
    /// Anonymous identity.
    #[default]
    Anonymous,

    /// User name and password.
    UserName {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
}

impl UserIdentity {
    /// Returns a loggable label without credentials.
    pub fn label(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::UserName { username, .. } => format!("user:{}", username),
        }
    }
}

// =============================================================================
// OpcUaConfig
// =============================================================================

/// OPC UA client configuration.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bhs_opcua::client::ReconnectPolicy;
/// use bhs_opcua::types::OpcUaConfig;
///
/// let config = OpcUaConfig::builder()
///     .endpoint("opc.tcp://plc-01:4840")
///     .username("operator", "secret")
///     .reconnect(ReconnectPolicy::fixed(Duration::from_secs(5)).with_max_attempts(20))
///     .build()
///     .unwrap();
/// assert_eq!(config.reconnect.max_attempts, Some(20));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaConfig {
    /// Server address (e.g., "opc.tcp://localhost:4840").
    pub endpoint: String,

    /// Application name presented to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Session name.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// User identity.
    #[serde(default)]
    pub identity: UserIdentity,

    /// Session timeout; also bounds opening the session.
    #[serde(default = "default_session_timeout")]
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Bound on closing the session during disconnect.
    #[serde(default = "default_close_timeout")]
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,

    /// Bound on a single request/response exchange.
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Reconnect policy applied after keep-alive loss.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Defaults for subscription containers.
    #[serde(default)]
    pub subscription: SubscriptionSettings,

    /// Browse behavior.
    #[serde(default)]
    pub browse: BrowseOptions,
}

fn default_application_name() -> String {
    "BHS OPC UA Client".to_string()
}

fn default_session_name() -> String {
    "BHS Session".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_close_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl OpcUaConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> OpcUaConfigBuilder {
        OpcUaConfigBuilder::default()
    }

    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.endpoint.is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::missing_field(
                "endpoint",
            )));
        }

        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "Endpoint must start with opc.tcp://",
            )));
        }

        for (field, value) in [
            ("session_timeout", self.session_timeout),
            ("close_timeout", self.close_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(OpcUaError::configuration(ConfigurationError::invalid_timeout(
                    field,
                    value,
                    "Timeout must be greater than 0",
                )));
            }
        }

        self.reconnect.validate()?;
        self.subscription.validate()?;
        Ok(())
    }
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            application_name: default_application_name(),
            session_name: default_session_name(),
            identity: UserIdentity::default(),
            session_timeout: default_session_timeout(),
            close_timeout: default_close_timeout(),
            request_timeout: default_request_timeout(),
            reconnect: ReconnectPolicy::default(),
            subscription: SubscriptionSettings::default(),
            browse: BrowseOptions::default(),
        }
    }
}

// =============================================================================
// OpcUaConfigBuilder
// =============================================================================

/// Builder for `OpcUaConfig`.
#[derive(Debug, Default)]
pub struct OpcUaConfigBuilder {
    endpoint: Option<String>,
    application_name: Option<String>,
    session_name: Option<String>,
    identity: Option<UserIdentity>,
    session_timeout: Option<Duration>,
    close_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    reconnect: Option<ReconnectPolicy>,
    subscription: Option<SubscriptionSettings>,
    browse: Option<BrowseOptions>,
}

impl OpcUaConfigBuilder {
    /// Sets the server address.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Sets username/password authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.identity = Some(UserIdentity::UserName {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets anonymous authentication.
    pub fn anonymous(mut self) -> Self {
        self.identity = Some(UserIdentity::Anonymous);
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the close timeout.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Sets the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the reconnect policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Sets the subscription defaults.
    pub fn subscription(mut self, settings: SubscriptionSettings) -> Self {
        self.subscription = Some(settings);
        self
    }

    /// Sets the browse options.
    pub fn browse(mut self, options: BrowseOptions) -> Self {
        self.browse = Some(options);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<OpcUaConfig, OpcUaError> {
        let endpoint = self.endpoint.ok_or_else(|| {
            OpcUaError::configuration(ConfigurationError::missing_field("endpoint"))
        })?;

        let config = OpcUaConfig {
            endpoint,
            application_name: self.application_name.unwrap_or_else(default_application_name),
            session_name: self.session_name.unwrap_or_else(default_session_name),
            identity: self.identity.unwrap_or_default(),
            session_timeout: self.session_timeout.unwrap_or_else(default_session_timeout),
            close_timeout: self.close_timeout.unwrap_or_else(default_close_timeout),
            request_timeout: self.request_timeout.unwrap_or_else(default_request_timeout),
            reconnect: self.reconnect.unwrap_or_default(),
            subscription: self.subscription.unwrap_or_default(),
            browse: self.browse.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Defaults applied to every subscription container the registry creates.
///
/// The defaults publish immediately, never expire on their own, and sample
/// each item every 100 ms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Publishing interval (zero lets the server publish as fast as it can).
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Keep-alive count.
    #[serde(default = "default_unlimited")]
    pub keepalive_count: u32,

    /// Lifetime count.
    #[serde(default = "default_unlimited")]
    pub lifetime_count: u32,

    /// Maximum notifications per publish.
    #[serde(default = "default_unlimited")]
    pub max_notifications_per_publish: u32,

    /// Priority.
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Default sampling interval for monitored items.
    #[serde(default = "default_sampling_interval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Queue size for monitored items.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,
}

fn default_unlimited() -> u32 {
    u32::MAX
}

fn default_priority() -> u8 {
    100
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_queue_size() -> u32 {
    1
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: Duration::ZERO,
            keepalive_count: default_unlimited(),
            lifetime_count: default_unlimited(),
            max_notifications_per_publish: default_unlimited(),
            priority: default_priority(),
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
        }
    }
}

impl SubscriptionSettings {
    /// Validates the settings.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.keepalive_count == 0 {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "subscription.keepalive_count",
                "Must be greater than 0",
            )));
        }
        if self.lifetime_count < self.keepalive_count.saturating_mul(3).min(u32::MAX) {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "subscription.lifetime_count",
                "Must be at least three times the keep-alive count",
            )));
        }
        if self.queue_size == 0 {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "subscription.queue_size",
                "Must be greater than 0",
            )));
        }
        Ok(())
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_node_id_parse_and_display() {
        let cases = [
            ("i=85", NodeId::numeric(0, 85)),
            ("ns=2;i=1001", NodeId::numeric(2, 1001)),
            ("ns=3;s=Line1.Speed", NodeId::string(3, "Line1.Speed")),
            ("ns=1;b=SGVsbG8=", NodeId::opaque(1, b"Hello".to_vec())),
        ];
        for (text, expected) in cases {
            let parsed: NodeId = text.parse().unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("x=1".parse::<NodeId>().is_err());
        assert!("s=".parse::<NodeId>().is_err());
        assert!("ns=2;g=not-a-guid".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_structural_hash() {
        let mut set = HashSet::new();
        set.insert(NodeId::string(2, "A"));
        assert!(set.contains(&"ns=2;s=A".parse::<NodeId>().unwrap()));
        assert!(!set.contains(&NodeId::string(3, "A")));
        assert!(NodeId::null().is_null());
        assert_eq!(NodeId::OBJECTS_FOLDER, NodeId::numeric(0, 85));
    }

    #[test]
    fn test_expanded_node_id_absolute() {
        let local = ExpandedNodeId::from(NodeId::numeric(2, 7));
        assert!(!local.is_absolute());
        assert_eq!(local.to_local(), Some(&NodeId::numeric(2, 7)));

        let remote = ExpandedNodeId::remote(NodeId::numeric(0, 7), "urn:remote", 1);
        assert!(remote.is_absolute());
        assert!(remote.to_local().is_none());
        assert_eq!(remote.to_string(), "svr=1;nsu=urn:remote;i=7");
    }

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN.is_uncertain());
        assert!(StatusCode::BAD_NOT_READABLE.is_bad());
        assert!(!StatusCode::BAD_NOT_READABLE.is_good());
        assert_eq!(StatusCode::BAD_NO_CONTINUATION_POINTS.name(), "BadNoContinuationPoints");
        assert_eq!(StatusCode(0x803B_0400).name(), "BadNotWritable");
        assert_eq!(
            StatusCode::BAD_TIMEOUT.to_string(),
            "BadTimeout (0x800A0000)"
        );
    }

    #[test]
    fn test_access_level_description() {
        assert_eq!(AccessLevel::NONE.description(), "None");
        assert_eq!(AccessLevel(1).description(), "CurrentRead");
        assert_eq!(AccessLevel(2).description(), "CurrentWrite");
        assert_eq!(AccessLevel(3).description(), "CurrentReadOrWrite");
        assert_eq!(AccessLevel(12).description(), "HistoryReadOrWrite");
        assert_eq!(AccessLevel(64).description(), "TimestampWrite");
        assert_eq!(AccessLevel(5).to_string(), "CurrentRead | HistoryRead");

        assert!(!AccessLevel::CURRENT_READ.is_writable());
        assert!((AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE).is_writable());
    }

    #[test]
    fn test_node_class_mask() {
        assert!(NodeClass::Variable.matches(NodeClass::ALL_MASK));
        assert!(NodeClass::Variable.matches(0));
        assert!(!NodeClass::Variable.matches(NodeClass::Object.value()));
        assert_eq!(NodeClass::from_value(128), Some(NodeClass::View));
        assert_eq!(NodeClass::from_value(3), None);
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!("Int32".parse::<OpcUaDataType>().unwrap(), OpcUaDataType::Int32);
        assert_eq!("bool".parse::<OpcUaDataType>().unwrap(), OpcUaDataType::Boolean);
        assert!("Double".parse::<OpcUaDataType>().is_err());
        assert_eq!(OpcUaDataType::DateTime.builtin_id(), 13);
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = OpcUaConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .build()
            .unwrap();

        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.close_timeout, Duration::from_secs(10));
        assert_eq!(config.identity, UserIdentity::Anonymous);
        assert_eq!(config.subscription.priority, 100);
        assert_eq!(config.subscription.keepalive_count, u32::MAX);
        assert_eq!(config.subscription.sampling_interval, Duration::from_millis(100));
        assert!(config.reconnect.max_attempts.is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(OpcUaConfig::builder().build().is_err());
        assert!(OpcUaConfig::builder().endpoint("http://x").build().is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://x:4840")
            .close_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_config_deserialize_humantime() {
        let json = r#"{
            "endpoint": "opc.tcp://plc:4840",
            "session_timeout": "30s",
            "identity": { "type": "user_name", "username": "op", "password": "pw" },
            "reconnect": { "delay": "2s", "max_attempts": 5 }
        }"#;
        let config: OpcUaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session_timeout, Duration::from_secs(30));
        assert_eq!(config.identity.label(), "user:op");
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert_eq!(config.close_timeout, Duration::from_secs(10));
        config.validate().unwrap();
    }
}
