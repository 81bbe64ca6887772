// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client error types with diagnostics.
//!
//! The hierarchy mirrors the client's components: each component fails
//! within its own category so callers can tell a failed browse from an
//! empty one, or a rejected write from a dropped connection.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint resolution, session open, transport faults
//! ├── Session       - Keep-alive loss and reconnect cycling
//! ├── Browse        - Address-space traversal failures
//! ├── Operation     - Read/write failures carrying the item status
//! ├── Subscription  - Subscription container create/delete failures
//! ├── Conversion    - Textual value conversion errors
//! ├── Configuration - Invalid settings
//! └── Timeout       - Bounded operations that ran out of time
//! ```
//!
//! # Examples
//!
//! ```
//! use bhs_opcua::error::{OpcUaError, OperationError};
//! use bhs_opcua::types::StatusCode;
//!
//! let error = OpcUaError::operation(OperationError::write_failed(
//!     "ns=2;s=Line1.Speed",
//!     StatusCode::BAD_NOT_WRITABLE,
//! ));
//!
//! assert_eq!(error.status_code(), Some(StatusCode::BAD_NOT_WRITABLE));
//! assert!(!error.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::types::StatusCode;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for OPC UA client operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session keep-alive and reconnect errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Node browsing errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Read/write operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Value conversion errors.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a browse error.
    #[inline]
    pub fn browse(error: BrowseError) -> Self {
        Self::Browse(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a conversion error.
    #[inline]
    pub fn conversion(error: ConversionError) -> Self {
        Self::Conversion(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a service fault for a failed request/response exchange.
    pub fn service_fault(service: impl Into<String>, status: StatusCode) -> Self {
        Self::Connection(ConnectionError::service_fault(service, status))
    }

    /// Creates a read failed error.
    pub fn read_failed(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::read_failed(node_id, status))
    }

    /// Creates a write failed error.
    pub fn write_failed(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::write_failed(node_id, status))
    }

    /// Creates an operation timeout.
    pub fn operation_timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout(TimeoutError::operation(operation, duration))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Browse(e) => e.is_retryable(),
            Self::Operation(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Conversion(_) | Self::Configuration(_) => false,
        }
    }

    /// Returns the OPC UA status code carried by this error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Connection(ConnectionError::ServiceFault { status, .. }) => Some(*status),
            Self::Session(SessionError::KeepAliveLost { status, .. }) => Some(*status),
            Self::Operation(OperationError::ReadFailed { status, .. })
            | Self::Operation(OperationError::WriteFailed { status, .. }) => Some(*status),
            Self::Subscription(SubscriptionError::MonitoredItemsFailed { status, .. }) => {
                Some(*status)
            }
            Self::Browse(BrowseError::Transport { source, .. }) => source.status_code(),
            _ => None,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Session(e) => e.severity(),
            Self::Browse(e) => e.severity(),
            Self::Operation(e) => e.severity(),
            Self::Subscription(e) => e.severity(),
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Conversion(_) => ErrorSeverity::Error,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Session(_) => "session",
            Self::Browse(_) => "browse",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Browse(e) => e.error_code(),
            Self::Operation(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Conversion(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Session(e) => e.recovery_hints(),
            Self::Browse(e) => e.recovery_hints(),
            Self::Operation(e) => e.recovery_hints(),
            Self::Subscription(e) => e.recovery_hints(),
            Self::Conversion(_) => vec!["Check the value matches the node's data type"],
            Self::Configuration(_) => vec!["Fix the configuration and restart"],
            Self::Timeout(_) => vec!["Increase the timeout", "Retry the operation"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
            Self::Browse(e) => e.user_message(),
            Self::Operation(e) => e.user_message(),
            Self::Subscription(e) => e.user_message(),
            Self::Conversion(e) => e.user_message(),
            Self::Configuration(e) => format!("설정 오류: {}", e),
            Self::Timeout(e) => e.user_message(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
///
/// Initial connects are never retried automatically; these errors are
/// surfaced to the caller of `connect`.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No usable endpoint could be resolved for the server address.
    #[error("Failed to resolve an endpoint for '{url}': {reason}")]
    EndpointResolution {
        /// Server address that was queried.
        url: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// The session could not be opened.
    #[error("Failed to open session on '{endpoint}': {reason}")]
    SessionOpenFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// Opening the session did not finish within the startup bound.
    #[error("Opening session on '{endpoint}' timed out after {duration:?}")]
    TimedOut {
        /// Endpoint URL.
        endpoint: String,
        /// Bound that was exceeded.
        duration: Duration,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A request/response exchange failed as a whole.
    #[error("Service '{service}' failed with {status}")]
    ServiceFault {
        /// Service name (Browse, Read, ...).
        service: String,
        /// Service-level status code.
        status: StatusCode,
    },

    /// The session was closed underneath the caller.
    #[error("Connection closed{}", .reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Closed {
        /// Reason for closure.
        reason: Option<String>,
    },

    /// Not connected.
    #[error("Not connected to OPC UA server")]
    NotConnected,
}

impl ConnectionError {
    /// Creates an endpoint resolution error.
    pub fn endpoint_resolution(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EndpointResolution {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a session open error.
    pub fn session_open_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SessionOpenFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timed out error.
    pub fn timed_out(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::TimedOut {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a service fault.
    pub fn service_fault(service: impl Into<String>, status: StatusCode) -> Self {
        Self::ServiceFault {
            service: service.into(),
            status,
        }
    }

    /// Creates a closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: Some(reason.into()),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidEndpoint { .. } => false,
            Self::ServiceFault { status, .. } => status.is_transient(),
            _ => true,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected | Self::TimedOut { .. } | Self::Closed { .. } => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EndpointResolution { .. } => ErrorCode::new(1, 1),
            Self::SessionOpenFailed { .. } => ErrorCode::new(1, 2),
            Self::TimedOut { .. } => ErrorCode::new(1, 3),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 4),
            Self::ServiceFault { .. } => ErrorCode::new(1, 5),
            Self::Closed { .. } => ErrorCode::new(1, 6),
            Self::NotConnected => ErrorCode::new(1, 7),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::EndpointResolution { .. } => vec![
                "Check if the OPC UA server is running",
                "Verify the server address is correct",
            ],
            Self::SessionOpenFailed { .. } => vec![
                "Check the user identity is accepted by the server",
                "Check the server session limit",
            ],
            Self::TimedOut { .. } => vec![
                "Check network connectivity to the server",
                "Increase the session timeout setting",
            ],
            Self::InvalidEndpoint { .. } => vec!["Use format: opc.tcp://hostname:port/path"],
            Self::ServiceFault { .. } => vec!["Retry the operation", "Check server diagnostics"],
            Self::Closed { .. } => vec!["Reconnect to the server"],
            Self::NotConnected => vec!["Call connect() before performing operations"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::EndpointResolution { url, .. } => {
                format!("엔드포인트를 찾을 수 없음: {}", url)
            }
            Self::SessionOpenFailed { endpoint, .. } => {
                format!("OPC UA 서버({})에 세션을 열 수 없습니다", endpoint)
            }
            Self::TimedOut { endpoint, .. } => {
                format!("OPC UA 서버({}) 연결 시간 초과", endpoint)
            }
            Self::InvalidEndpoint { url, .. } => format!("잘못된 엔드포인트 URL: {}", url),
            Self::ServiceFault { service, .. } => format!("서비스 요청 실패: {}", service),
            Self::Closed { .. } => "연결이 끊어졌습니다".to_string(),
            Self::NotConnected => "OPC UA 서버에 연결되어 있지 않습니다".to_string(),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Errors raised while keeping an established session alive.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport reported a bad keep-alive for the active session.
    #[error("Keep-alive lost for session '{session_id}': {status}")]
    KeepAliveLost {
        /// Session identifier.
        session_id: String,
        /// Status carried by the keep-alive report.
        status: StatusCode,
    },

    /// A single reconnect attempt failed.
    #[error("Reconnect attempt {attempt} failed: {reason}")]
    ReconnectFailed {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Reason reported by the transport.
        reason: String,
    },

    /// The reconnect policy gave up.
    #[error("Reconnect abandoned after {attempts} attempts")]
    ReconnectAbandoned {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Closing the session failed.
    #[error("Failed to close session '{session_id}': {reason}")]
    CloseFailed {
        /// Session identifier.
        session_id: String,
        /// Reason reported by the transport.
        reason: String,
    },
}

impl SessionError {
    /// Creates a keep-alive lost error.
    pub fn keep_alive_lost(session_id: impl Into<String>, status: StatusCode) -> Self {
        Self::KeepAliveLost {
            session_id: session_id.into(),
            status,
        }
    }

    /// Creates a reconnect failed error.
    pub fn reconnect_failed(attempt: u32, reason: impl Into<String>) -> Self {
        Self::ReconnectFailed {
            attempt,
            reason: reason.into(),
        }
    }

    /// Creates a close failed error.
    pub fn close_failed(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CloseFailed {
            session_id: session_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ReconnectAbandoned { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::KeepAliveLost { .. } | Self::ReconnectFailed { .. } => ErrorSeverity::Warning,
            Self::CloseFailed { .. } => ErrorSeverity::Warning,
            Self::ReconnectAbandoned { .. } => ErrorSeverity::Critical,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::KeepAliveLost { .. } => ErrorCode::new(2, 1),
            Self::ReconnectFailed { .. } => ErrorCode::new(2, 2),
            Self::ReconnectAbandoned { .. } => ErrorCode::new(2, 3),
            Self::CloseFailed { .. } => ErrorCode::new(2, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::KeepAliveLost { .. } | Self::ReconnectFailed { .. } => {
                vec!["The client reconnects automatically"]
            }
            Self::ReconnectAbandoned { .. } => vec![
                "Check the server is reachable",
                "Call connect() again",
                "Raise max_attempts in the reconnect policy",
            ],
            Self::CloseFailed { .. } => vec!["The session is discarded locally regardless"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::KeepAliveLost { .. } => "서버 응답이 끊겼습니다. 재연결 중입니다".to_string(),
            Self::ReconnectFailed { attempt, .. } => format!("재연결 시도 {} 실패", attempt),
            Self::ReconnectAbandoned { attempts } => {
                format!("{}회 재연결 시도 후 중단되었습니다", attempts)
            }
            Self::CloseFailed { .. } => "세션 종료 중 오류가 발생했습니다".to_string(),
        }
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Address-space browsing errors.
///
/// An empty child list is a valid outcome and never one of these.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// The browse or browse-next exchange itself failed.
    #[error("Browse of '{node_id}' failed: {source}")]
    Transport {
        /// Node being browsed.
        node_id: String,
        /// Underlying transport error.
        #[source]
        source: Box<OpcUaError>,
    },

    /// The server kept refusing continuation points.
    #[error("Browse of '{node_id}' gave up after {passes} passes without continuation points")]
    ContinuationPointsExhausted {
        /// Node being browsed.
        node_id: String,
        /// Number of passes made.
        passes: u32,
    },

    /// The server returned a result list that does not pair with the request.
    #[error("Browse response has {actual} results for {expected} requests")]
    ResponseMismatch {
        /// Number of requests sent.
        expected: usize,
        /// Number of results received.
        actual: usize,
    },
}

impl BrowseError {
    /// Creates a transport failure error.
    pub fn transport(node_id: impl Into<String>, source: OpcUaError) -> Self {
        Self::Transport {
            node_id: node_id.into(),
            source: Box::new(source),
        }
    }

    /// Creates a continuation points exhausted error.
    pub fn continuation_points_exhausted(node_id: impl Into<String>, passes: u32) -> Self {
        Self::ContinuationPointsExhausted {
            node_id: node_id.into(),
            passes,
        }
    }

    /// Creates a response mismatch error.
    pub fn response_mismatch(expected: usize, actual: usize) -> Self {
        Self::ResponseMismatch { expected, actual }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_retryable(),
            Self::ContinuationPointsExhausted { .. } => true,
            Self::ResponseMismatch { .. } => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transport { .. } => ErrorSeverity::Error,
            Self::ContinuationPointsExhausted { .. } => ErrorSeverity::Warning,
            Self::ResponseMismatch { .. } => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } => ErrorCode::new(4, 1),
            Self::ContinuationPointsExhausted { .. } => ErrorCode::new(4, 2),
            Self::ResponseMismatch { .. } => ErrorCode::new(4, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Transport { .. } => vec!["Check the connection", "Retry the browse"],
            Self::ContinuationPointsExhausted { .. } => vec![
                "The server is out of continuation points; retry later",
                "Raise max_retry_passes in the browse options",
            ],
            Self::ResponseMismatch { .. } => vec!["Check server conformance"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { node_id, .. } => format!("노드 탐색 실패: {}", node_id),
            Self::ContinuationPointsExhausted { node_id, .. } => {
                format!("노드 탐색이 완료되지 않았습니다: {}", node_id)
            }
            Self::ResponseMismatch { .. } => "서버 응답 형식이 올바르지 않습니다".to_string(),
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Read/write operation errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The read returned a bad per-item status.
    #[error("Read failed for node '{node_id}': {status}")]
    ReadFailed {
        /// Node ID.
        node_id: String,
        /// Per-item status code.
        status: StatusCode,
    },

    /// The write returned a bad per-item status.
    #[error("Write failed for node '{node_id}': {status}")]
    WriteFailed {
        /// Node ID.
        node_id: String,
        /// Per-item status code.
        status: StatusCode,
    },

    /// Batched write called with lists of different length.
    #[error("Batch write has {nodes} node ids but {values} values")]
    BatchLengthMismatch {
        /// Number of node ids.
        nodes: usize,
        /// Number of values.
        values: usize,
    },

    /// The server returned a result list that does not pair with the request.
    #[error("{service} response has {actual} results for {expected} items")]
    ResponseMismatch {
        /// Service name.
        service: String,
        /// Number of items requested.
        expected: usize,
        /// Number of results received.
        actual: usize,
    },

    /// An asynchronous operation was cancelled before it completed.
    #[error("Operation '{operation}' was cancelled")]
    Cancelled {
        /// Operation name.
        operation: String,
    },
}

impl OperationError {
    /// Creates a read failed error.
    pub fn read_failed(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::ReadFailed {
            node_id: node_id.into(),
            status,
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::WriteFailed {
            node_id: node_id.into(),
            status,
        }
    }

    /// Creates a batch length mismatch error.
    pub fn batch_length_mismatch(nodes: usize, values: usize) -> Self {
        Self::BatchLengthMismatch { nodes, values }
    }

    /// Creates a response mismatch error.
    pub fn response_mismatch(service: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ResponseMismatch {
            service: service.into(),
            expected,
            actual,
        }
    }

    /// Creates a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ReadFailed { status, .. } | Self::WriteFailed { status, .. } => {
                status.is_transient()
            }
            _ => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ReadFailed { .. } | Self::WriteFailed { .. } => ErrorSeverity::Warning,
            Self::BatchLengthMismatch { .. } => ErrorSeverity::Error,
            Self::ResponseMismatch { .. } => ErrorSeverity::Error,
            Self::Cancelled { .. } => ErrorSeverity::Info,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadFailed { .. } => ErrorCode::new(5, 1),
            Self::WriteFailed { .. } => ErrorCode::new(5, 2),
            Self::BatchLengthMismatch { .. } => ErrorCode::new(5, 3),
            Self::ResponseMismatch { .. } => ErrorCode::new(5, 4),
            Self::Cancelled { .. } => ErrorCode::new(5, 5),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ReadFailed { .. } => vec!["Verify the node exists and is readable"],
            Self::WriteFailed { .. } => vec![
                "Check the node's access level",
                "Write a value of the node's declared data type",
            ],
            Self::BatchLengthMismatch { .. } => vec!["Pass one value per node id"],
            Self::ResponseMismatch { .. } => vec!["Check server conformance"],
            Self::Cancelled { .. } => vec![],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ReadFailed { node_id, .. } => format!("노드 읽기 실패: {}", node_id),
            Self::WriteFailed { node_id, .. } => format!("노드 쓰기 실패: {}", node_id),
            Self::BatchLengthMismatch { nodes, values } => {
                format!("노드 수({})와 값 수({})가 다릅니다", nodes, values)
            }
            Self::ResponseMismatch { .. } => "서버 응답 형식이 올바르지 않습니다".to_string(),
            Self::Cancelled { .. } => "작업이 취소되었습니다".to_string(),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription registry errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The subscription key is not usable.
    #[error("Invalid subscription key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Reason.
        reason: String,
    },

    /// Subscribe was called without any node.
    #[error("Subscription '{key}' has no monitored items")]
    NoMonitoredItems {
        /// Subscription key.
        key: String,
    },

    /// The server refused to create the subscription container.
    #[error("Failed to create subscription '{key}': {reason}")]
    CreationFailed {
        /// Subscription key.
        key: String,
        /// Reason.
        reason: String,
    },

    /// One or more monitored items were rejected.
    #[error("Monitored item '{node_id}' of subscription '{key}' rejected: {status}")]
    MonitoredItemsFailed {
        /// Subscription key.
        key: String,
        /// First rejected node.
        node_id: String,
        /// Its status code.
        status: StatusCode,
    },

    /// Deleting the subscription container on the server failed.
    #[error("Failed to delete subscription '{key}' (id {subscription_id}): {reason}")]
    DeleteFailed {
        /// Subscription key.
        key: String,
        /// Server-assigned subscription id.
        subscription_id: u32,
        /// Reason.
        reason: String,
    },
}

impl SubscriptionError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no monitored items error.
    pub fn no_monitored_items(key: impl Into<String>) -> Self {
        Self::NoMonitoredItems { key: key.into() }
    }

    /// Creates a creation failed error.
    pub fn creation_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a monitored items failed error.
    pub fn monitored_items_failed(
        key: impl Into<String>,
        node_id: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self::MonitoredItemsFailed {
            key: key.into(),
            node_id: node_id.into(),
            status,
        }
    }

    /// Creates a delete failed error.
    pub fn delete_failed(
        key: impl Into<String>,
        subscription_id: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeleteFailed {
            key: key.into(),
            subscription_id,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. } | Self::DeleteFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidKey { .. } | Self::NoMonitoredItems { .. } => ErrorSeverity::Error,
            Self::CreationFailed { .. } | Self::MonitoredItemsFailed { .. } => {
                ErrorSeverity::Error
            }
            Self::DeleteFailed { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidKey { .. } => ErrorCode::new(6, 1),
            Self::NoMonitoredItems { .. } => ErrorCode::new(6, 2),
            Self::CreationFailed { .. } => ErrorCode::new(6, 3),
            Self::MonitoredItemsFailed { .. } => ErrorCode::new(6, 4),
            Self::DeleteFailed { .. } => ErrorCode::new(6, 5),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidKey { .. } => vec!["Use a non-empty key"],
            Self::NoMonitoredItems { .. } => vec!["Pass at least one node id"],
            Self::CreationFailed { .. } => vec!["Check the server subscription limit"],
            Self::MonitoredItemsFailed { .. } => vec!["Verify the node ids exist"],
            Self::DeleteFailed { .. } => vec![
                "The subscription may be orphaned on the server",
                "It expires with the server session",
            ],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidKey { key, .. } => format!("잘못된 구독 키: {}", key),
            Self::NoMonitoredItems { key } => format!("구독({})에 노드가 없습니다", key),
            Self::CreationFailed { key, .. } => format!("구독 생성 실패: {}", key),
            Self::MonitoredItemsFailed { node_id, .. } => {
                format!("모니터링 항목 생성 실패: {}", node_id)
            }
            Self::DeleteFailed { key, .. } => format!("구독 삭제 실패: {}", key),
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value conversion errors.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Text could not be parsed as the requested data type.
    #[error("Cannot parse '{input}' as {data_type}: {reason}")]
    ParseFailed {
        /// Target data type.
        data_type: String,
        /// Offending input.
        input: String,
        /// Reason.
        reason: String,
    },

    /// The data type has no textual conversion.
    #[error("Data type {data_type} is not supported")]
    UnsupportedType {
        /// The data type.
        data_type: String,
    },
}

impl ConversionError {
    /// Creates a parse failed error.
    pub fn parse_failed(
        data_type: impl fmt::Display,
        input: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::ParseFailed {
            data_type: data_type.to_string(),
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(data_type: impl fmt::Display) -> Self {
        Self::UnsupportedType {
            data_type: data_type.to_string(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ParseFailed { .. } => ErrorCode::new(7, 1),
            Self::UnsupportedType { .. } => ErrorCode::new(7, 2),
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ParseFailed {
                data_type, input, ..
            } => format!("'{}' 값을 {} 형식으로 변환할 수 없습니다", input, data_type),
            Self::UnsupportedType { data_type } => {
                format!("지원하지 않는 데이터 형식: {}", data_type)
            }
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// The URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// Invalid timeout value.
    #[error("Invalid {field} {value:?}: {reason}")]
    InvalidTimeout {
        /// Field name.
        field: String,
        /// Offending value.
        value: Duration,
        /// Reason.
        reason: String,
    },

    /// Invalid node id text.
    #[error("Invalid node ID '{input}': {reason}")]
    InvalidNodeId {
        /// The input text.
        input: String,
        /// Reason.
        reason: String,
    },

    /// Invalid reconnect policy.
    #[error("Invalid reconnect policy: {reason}")]
    InvalidRetryPolicy {
        /// Reason.
        reason: String,
    },

    /// Invalid value for a field.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid timeout error.
    pub fn invalid_timeout(
        field: impl Into<String>,
        value: Duration,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTimeout {
            field: field.into(),
            value,
            reason: reason.into(),
        }
    }

    /// Creates an invalid node ID error.
    pub fn invalid_node_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid retry policy error.
    pub fn invalid_retry_policy(reason: impl Into<String>) -> Self {
        Self::InvalidRetryPolicy {
            reason: reason.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::new(8, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(8, 2),
            Self::InvalidTimeout { .. } => ErrorCode::new(8, 3),
            Self::InvalidNodeId { .. } => ErrorCode::new(8, 4),
            Self::InvalidRetryPolicy { .. } => ErrorCode::new(8, 5),
            Self::InvalidValue { .. } => ErrorCode::new(8, 6),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Timeout errors.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// An operation exceeded its bound.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Operation {
        /// Operation name.
        operation: String,
        /// Bound that was exceeded.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Creates an operation timeout.
    pub fn operation(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Operation {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns the timeout duration.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Operation { duration, .. } => *duration,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Operation { .. } => ErrorCode::new(9, 1),
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Operation { operation, .. } => format!("작업 시간 초과: {}", operation),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Session
/// - 4: Browse
/// - 5: Operation
/// - 6: Subscription
/// - 7: Conversion
/// - 8: Configuration
/// - 9: Timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_retryable() {
        assert!(ConnectionError::endpoint_resolution("opc.tcp://host:4840", "refused")
            .is_retryable());
        assert!(ConnectionError::NotConnected.is_retryable());
        assert!(!ConnectionError::invalid_endpoint("bad-url", "no scheme").is_retryable());
        assert!(
            ConnectionError::service_fault("Browse", StatusCode::BAD_TIMEOUT).is_retryable()
        );
        assert!(
            !ConnectionError::service_fault("Browse", StatusCode::BAD_NODE_ID_UNKNOWN)
                .is_retryable()
        );
    }

    #[test]
    fn test_status_code_propagation() {
        let error = OpcUaError::read_failed("ns=2;s=X", StatusCode::BAD_NOT_READABLE);
        assert_eq!(error.status_code(), Some(StatusCode::BAD_NOT_READABLE));

        let nested = OpcUaError::browse(BrowseError::transport(
            "i=85",
            OpcUaError::service_fault("Browse", StatusCode::BAD_TIMEOUT),
        ));
        assert_eq!(nested.status_code(), Some(StatusCode::BAD_TIMEOUT));
        assert!(nested.is_retryable());

        assert_eq!(OpcUaError::not_connected().status_code(), None);
    }

    #[test]
    fn test_browse_error_message() {
        let error = BrowseError::continuation_points_exhausted("ns=2;s=Folder", 3);
        assert!(error.to_string().contains("ns=2;s=Folder"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_batch_length_mismatch() {
        let error = OpcUaError::operation(OperationError::batch_length_mismatch(3, 2));
        assert!(!error.is_retryable());
        assert_eq!(error.severity(), ErrorSeverity::Error);
        assert!(error.to_string().contains("3 node ids but 2 values"));
    }

    #[test]
    fn test_session_error_severity() {
        let abandoned = SessionError::ReconnectAbandoned { attempts: 5 };
        assert_eq!(abandoned.severity(), ErrorSeverity::Critical);
        assert!(!abandoned.is_retryable());

        let lost = SessionError::keep_alive_lost("s-1", StatusCode::BAD_CONNECTION_CLOSED);
        assert_eq!(lost.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_error_code_display() {
        let code = ErrorCode::new(5, 2);
        assert_eq!(code.to_string(), "UA-0502");
        assert_eq!(code.as_u16(), 0x0502);

        let error = OpcUaError::write_failed("ns=2;s=X", StatusCode::BAD_NOT_WRITABLE);
        assert_eq!(error.error_code(), ErrorCode::new(5, 2));
        assert_eq!(error.category(), "operation");
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), Level::ERROR);
    }

    #[test]
    fn test_closed_display() {
        assert_eq!(
            ConnectionError::Closed { reason: None }.to_string(),
            "Connection closed"
        );
        assert_eq!(
            ConnectionError::closed("server shutdown").to_string(),
            "Connection closed: server shutdown"
        );
    }
}
