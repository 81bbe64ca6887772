// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use bhs_opcua::{OpcUaConfig, UserIdentity};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::config::resolve_config;
use crate::error::{CliError, CliResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: &ValidateArgs) -> CliResult<()> {
    let config = resolve_config(cli.config.as_deref(), cli.endpoint.as_deref())?;
    let source = cli
        .config
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());

    print!("{}", render_validation(&source, &config, args)?);
    Ok(())
}

/// Returns notes on settings that are valid but worth a second look.
pub(crate) fn collect_warnings(config: &OpcUaConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.reconnect.max_attempts.is_none() {
        warnings.push("Reconnect attempts are unbounded".to_string());
    }
    if config.request_timeout > config.session_timeout {
        warnings.push(format!(
            "request_timeout ({:?}) exceeds session_timeout ({:?})",
            config.request_timeout, config.session_timeout
        ));
    }
    if matches!(config.identity, UserIdentity::Anonymous) {
        warnings.push("Anonymous identity".to_string());
    }

    warnings
}

fn render_validation(source: &str, config: &OpcUaConfig, args: &ValidateArgs) -> CliResult<String> {
    let warnings = collect_warnings(config);
    let serialize = |e: String| CliError::io(e);

    match args.format {
        OutputFormat::Text => {
            let mut out = format!("✓ Configuration is valid: {}\n\n", source);
            out.push_str("Summary:\n");
            out.push_str(&format!("  Endpoint: {}\n", config.endpoint));
            out.push_str(&format!("  Session: {}\n", config.session_name));
            out.push_str(&format!("  Session timeout: {:?}\n", config.session_timeout));
            out.push_str(&format!(
                "  Reconnect: {:?} every {:?}, {}\n",
                config.reconnect.strategy,
                config.reconnect.delay,
                config
                    .reconnect
                    .max_attempts
                    .map(|n| format!("at most {} attempts", n))
                    .unwrap_or_else(|| "no attempt limit".to_string())
            ));

            if !warnings.is_empty() {
                out.push_str("\nWarnings:\n");
                for warning in &warnings {
                    out.push_str(&format!("  ⚠ {}\n", warning));
                }
            }

            if args.show_config {
                out.push_str("\nParsed configuration:\n");
                out.push_str(
                    &serde_yaml::to_string(config).map_err(|e| serialize(e.to_string()))?,
                );
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": source,
                "endpoint": config.endpoint,
                "warnings": warnings,
                "config": if args.show_config { Some(config) } else { None },
            });
            serde_json::to_string_pretty(&output)
                .map(|json| json + "\n")
                .map_err(|e| serialize(e.to_string()))
        }
        OutputFormat::Yaml => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": source,
                "endpoint": config.endpoint,
                "warnings": warnings,
            });
            serde_yaml::to_string(&output).map_err(|e| serialize(e.to_string()))
        }
    }
}
