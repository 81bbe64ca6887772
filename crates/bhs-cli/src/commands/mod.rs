// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `browse`: Print the address space below a node
//! - `read` / `attributes`: Read values or attribute sets
//! - `write`: Write a value given as text
//! - `watch`: Subscribe and print changes until Ctrl+C
//! - `validate`: Validate configuration file
//! - `version`: Show version information
//!
//! Node commands run against an in-process simulated plant answering on
//! the configured endpoint; the client itself is the production client.

mod browse;
mod read;
mod validate;
mod version;
mod watch;
mod write;

pub use browse::browse;
pub use read::{attributes, read};
pub use validate::validate;
pub use version::version;
pub use watch::watch;
pub use write::write;

use std::str::FromStr;

use bhs_opcua::simulation::SimulatedServer;
use bhs_opcua::{NodeId, OpcUaClient};
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::config::resolve_config;
use crate::error::{CliError, CliResult};

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Browse(args) => browse::browse(&cli, args).await,
        Commands::Read(args) => read::read(&cli, args).await,
        Commands::Write(args) => write::write(&cli, args).await,
        Commands::Attributes(args) => read::attributes(&cli, args).await,
        Commands::Watch(args) => watch::watch(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A connected client together with the server it talks to.
pub(crate) struct Connection {
    pub(crate) server: SimulatedServer,
    pub(crate) client: OpcUaClient,
}

impl Connection {
    /// Resolves the configuration and connects.
    pub(crate) async fn open(cli: &Cli) -> CliResult<Self> {
        let config = resolve_config(cli.config.as_deref(), cli.endpoint.as_deref())?;
        let server = SimulatedServer::plant_at(config.endpoint.clone());
        let client = OpcUaClient::new(config, server.transport());

        client
            .connect()
            .await
            .map_err(|e| CliError::from(e).with_context("Failed to connect"))?;
        debug!(endpoint = %client.config().endpoint, "Connected");

        Ok(Self { server, client })
    }

    /// Disconnects, removing any subscriptions.
    pub(crate) async fn close(self) -> CliResult<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Parses node ids given on the command line.
pub(crate) fn parse_nodes(texts: &[String]) -> CliResult<Vec<NodeId>> {
    texts
        .iter()
        .map(|text| NodeId::from_str(text).map_err(CliError::from))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
