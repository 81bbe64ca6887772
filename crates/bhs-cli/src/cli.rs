// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `browse`: Print the address space below a node
//! - `read`: Read node values
//! - `write`: Write a value given as text
//! - `attributes`: Show node attributes
//! - `watch`: Subscribe to nodes until Ctrl+C
//! - `validate`: Validate the configuration file
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// bhs-opc - OPC UA client command line
///
/// Browses, reads, writes and watches nodes of an OPC UA server.
#[derive(Parser, Debug)]
#[command(
    name = "bhs-opc",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "OPC UA client: browse, read, write and watch nodes",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path (YAML or TOML)
    #[arg(short, long, env = "BHS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Server endpoint, overrides the configuration file
    #[arg(short, long, env = "BHS_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "BHS_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "BHS_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the address space below a node
    ///
    /// Starts at the Objects folder when no node is given.
    Browse(BrowseArgs),

    /// Read the values of one or more nodes
    Read(ReadArgs),

    /// Write a value to a node
    ///
    /// The text is parsed as the kind the node currently holds.
    Write(WriteArgs),

    /// Show NodeClass, Value, AccessLevel, DisplayName and Description
    Attributes(AttributesArgs),

    /// Subscribe to nodes and print changes until Ctrl+C
    Watch(WatchArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without connecting.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `browse` command.
#[derive(Args, Debug, Default, Clone)]
pub struct BrowseArgs {
    /// Starting node (e.g. `ns=2;s=Plant`)
    pub node: Option<String>,

    /// Levels to descend below the starting node
    #[arg(short, long, default_value = "1")]
    pub depth: usize,
}

/// Arguments for the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Nodes to read
    #[arg(required = true)]
    pub nodes: Vec<String>,

    /// Output format for the values
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `write` command.
#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    /// Node to write
    pub node: String,

    /// Value as text
    pub value: String,
}

/// Arguments for the `attributes` command.
#[derive(Args, Debug, Clone)]
pub struct AttributesArgs {
    /// Nodes to describe
    #[arg(required = true)]
    pub nodes: Vec<String>,
}

/// Arguments for the `watch` command.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Nodes to monitor
    #[arg(required = true)]
    pub nodes: Vec<String>,

    /// Subscription key
    #[arg(short, long, default_value = "watch")]
    pub key: String,

    /// Sampling interval in milliseconds
    #[arg(short, long)]
    pub sampling_ms: Option<u64>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
    /// YAML format
    Yaml,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Get the effective log level based on flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browse_defaults() {
        let cli = Cli::parse_from(["bhs-opc", "browse"]);
        if let Commands::Browse(args) = cli.command {
            assert!(args.node.is_none());
            assert_eq!(args.depth, 1);
        } else {
            panic!("Expected Browse command");
        }
    }

    #[test]
    fn test_browse_with_depth() {
        let cli = Cli::parse_from(["bhs-opc", "browse", "ns=2;s=Plant", "-d", "3"]);
        if let Commands::Browse(args) = cli.command {
            assert_eq!(args.node.as_deref(), Some("ns=2;s=Plant"));
            assert_eq!(args.depth, 3);
        } else {
            panic!("Expected Browse command");
        }
    }

    #[test]
    fn test_read_requires_node() {
        assert!(Cli::try_parse_from(["bhs-opc", "read"]).is_err());

        let cli = Cli::parse_from(["bhs-opc", "read", "i=2258", "ns=2;s=A", "-f", "json"]);
        if let Commands::Read(args) = cli.command {
            assert_eq!(args.nodes, vec!["i=2258", "ns=2;s=A"]);
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Read command");
        }
    }

    #[test]
    fn test_write_command() {
        let cli = Cli::parse_from(["bhs-opc", "write", "ns=2;s=A", "100"]);
        if let Commands::Write(args) = cli.command {
            assert_eq!(args.node, "ns=2;s=A");
            assert_eq!(args.value, "100");
        } else {
            panic!("Expected Write command");
        }
    }

    #[test]
    fn test_watch_command() {
        let cli = Cli::parse_from(["bhs-opc", "watch", "ns=2;s=A", "-k", "line1", "-s", "250"]);
        if let Commands::Watch(args) = cli.command {
            assert_eq!(args.key, "line1");
            assert_eq!(args.sampling_ms, Some(250));
        } else {
            panic!("Expected Watch command");
        }
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from([
            "bhs-opc",
            "version",
            "-c",
            "/etc/bhs/client.toml",
            "-e",
            "opc.tcp://plc:4840",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/bhs/client.toml")));
        assert_eq!(cli.endpoint.as_deref(), Some("opc.tcp://plc:4840"));
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["bhs-opc", "version", "-q"]);
        assert!(cli.quiet);
        assert_eq!(cli.effective_log_level(), "warn");
    }

    #[test]
    fn test_verbose_mode() {
        let cli = Cli::parse_from(["bhs-opc", "version", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level(), "debug");
    }
}
