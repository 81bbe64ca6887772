// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `browse` command.

use std::str::FromStr;

use bhs_opcua::{BrowseEntry, NodeId};

use super::Connection;
use crate::cli::{BrowseArgs, Cli};
use crate::error::CliResult;

/// Executes the `browse` command, printing one indented line per node.
pub async fn browse(cli: &Cli, args: &BrowseArgs) -> CliResult<()> {
    let start = match &args.node {
        Some(text) => NodeId::from_str(text)?,
        None => NodeId::OBJECTS_FOLDER,
    };

    let connection = Connection::open(cli).await?;
    let entries = connection
        .client
        .browser()
        .browse_tree(&start, Some(args.depth))
        .await;
    let closed = connection.close().await;

    print!("{}", render_tree(&start, &entries?));
    closed
}

/// Renders the entries of a tree walk below `start`.
pub(crate) fn render_tree(start: &NodeId, entries: &[BrowseEntry]) -> String {
    let mut out = format!("{}\n", start);
    if entries.is_empty() {
        out.push_str("  (no children)\n");
    }
    for entry in entries {
        out.push_str(&format!("  {}\n", entry));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhs_opcua::simulation::SimulatedServer;
    use bhs_opcua::{OpcUaClient, OpcUaConfig};

    #[tokio::test]
    async fn test_render_plant_tree() {
        let server = SimulatedServer::plant();
        let client = OpcUaClient::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
        client.connect().await.unwrap();

        let plant = NodeId::string(2, "Plant");
        let entries = client.browser().browse_tree(&plant, Some(1)).await.unwrap();
        let text = render_tree(&plant, &entries);

        assert!(text.starts_with("ns=2;s=Plant\n"));
        assert!(text.contains("  Line1 (ns=2;s=Plant.Line1)"));
        assert!(text.contains("  Line2 (ns=2;s=Plant.Line2)"));
        assert!(!text.contains("Speed"));
    }

    #[test]
    fn test_render_empty() {
        let entries: Vec<BrowseEntry> = Vec::new();
        assert_eq!(
            render_tree(&NodeId::OBJECTS_FOLDER, &entries),
            "i=85\n  (no children)\n"
        );
    }
}
