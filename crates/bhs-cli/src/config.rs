// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration loading.
//!
//! The file format follows the extension: `.yaml` / `.yml` or `.toml`.
//! Without a file the built-in defaults are used against the simulated
//! endpoint. `--endpoint` overrides whatever the file says.
//!
//! ```yaml
//! endpoint: opc.tcp://simulated:4840
//! session_timeout: 30s
//! reconnect:
//!   strategy: exponential
//!   delay: 1s
//!   max_delay: 30s
//! ```

use std::fs;
use std::path::Path;

use bhs_opcua::simulation::DEFAULT_ENDPOINT;
use bhs_opcua::OpcUaConfig;
use tracing::{debug, info};

use crate::error::{CliError, CliResult};

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> CliResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some(other) => Err(CliError::UnsupportedFormat(other.to_string())),
            None => Err(CliError::UnsupportedFormat("(no extension)".to_string())),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Resolves the effective configuration for a command.
///
/// Reads `path` when given, applies the `endpoint` override and validates
/// the result.
pub fn resolve_config(path: Option<&Path>, endpoint: Option<&str>) -> CliResult<OpcUaConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => {
            debug!("No configuration file, using defaults");
            OpcUaConfig::new(DEFAULT_ENDPOINT)
        }
    };

    if let Some(endpoint) = endpoint {
        debug!(endpoint, "Endpoint overridden from command line");
        config.endpoint = endpoint.to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Loads a configuration file without validating it.
pub fn load_config(path: &Path) -> CliResult<OpcUaConfig> {
    info!("Loading configuration from: {}", path.display());

    if !path.exists() {
        return Err(CliError::config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io(e.to_string()).with_context(path.display().to_string()))?;

    load_config_str(&content, format)
        .map_err(|e| e.with_context(format!("Failed to parse {}", path.display())))
}

/// Parses configuration text in `format`.
pub fn load_config_str(content: &str, format: ConfigFormat) -> CliResult<OpcUaConfig> {
    match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| CliError::config(e.to_string()))
        }
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| CliError::config(e.to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================
