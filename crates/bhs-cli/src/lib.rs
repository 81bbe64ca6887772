// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # bhs-cli
//!
//! Command-line front end for the `bhs-opcua` client.
//!
//! - CLI argument parsing with clap
//! - YAML / TOML configuration loading
//! - Logging initialization
//! - Ctrl+C handling for `watch`
//! - Command implementations (browse, read, write, attributes, watch, ...)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                             │
//! │                      (Entry Point)                          │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    │ (Argument   │
//!                    │  Parsing)   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │  config  │ │ logging  │
//!        │          │ │          │ │          │
//!        └──────────┘ └──────────┘ └──────────┘
//!               │
//!               ├──────────────┐
//!               │       ┌──────▼──────┐
//!               │       │  shutdown   │
//!               │       │  (watch)    │
//!               │       └─────────────┘
//!        ┌──────▼──────┐
//!        │  bhs-opcua  │
//!        └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Print the plant hierarchy two levels deep
//! bhs-opc browse "ns=2;s=Plant" --depth 2
//!
//! # Read values as JSON
//! bhs-opc read "ns=2;s=Plant.Line1.Speed" "ns=2;s=Plant.Line1.Count" -f json
//!
//! # Write a setpoint
//! bhs-opc write "ns=2;s=Plant.Line1.Setpoint" 1800
//!
//! # Watch changes until Ctrl+C
//! bhs-opc watch "ns=2;s=Plant.Line1.Count" --key line1
//!
//! # Validate a configuration file
//! bhs-opc -c client.yaml validate --show-config
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{CliError, CliResult};
pub use logging::init_logging;
pub use shutdown::StopSignal;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
