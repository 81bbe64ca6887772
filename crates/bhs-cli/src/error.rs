// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the `bhs-opc` binary.

use bhs_opcua::OpcUaError;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file extension is not YAML or TOML.
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Client error.
    #[error("{0}")]
    OpcUa(#[from] OpcUaError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<CliError>,
    },
}

impl CliError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::UnsupportedFormat(_) => 1,
            Self::Io(_) => 4,
            Self::OpcUa(e) if e.is_retryable() => 3,
            Self::OpcUa(_) => 2,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with its cause chain on stderr.
pub fn report_error(error: &CliError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bhs_opcua::{ConnectionError, OperationError, StatusCode};

    #[test]
    fn test_error_creation() {
        let err = CliError::config("test error");
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_error_with_context() {
        let err = CliError::config("inner error").with_context("outer context");
        assert_eq!(err.to_string(), "outer context: Configuration error: inner error");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("test").exit_code(), 1);
        assert_eq!(CliError::UnsupportedFormat("ini".into()).exit_code(), 1);
        assert_eq!(CliError::io("test").exit_code(), 4);

        let write = OpcUaError::operation(OperationError::write_failed(
            "ns=2;s=A",
            StatusCode::BAD_TYPE_MISMATCH,
        ));
        assert_eq!(CliError::from(write).exit_code(), 2);

        let not_connected = OpcUaError::connection(ConnectionError::NotConnected);
        let expected = if not_connected.is_retryable() { 3 } else { 2 };
        assert_eq!(CliError::from(not_connected).exit_code(), expected);
    }
}
