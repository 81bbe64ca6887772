// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `read` and `attributes` commands.

use bhs_opcua::client::conversion::format_value;
use bhs_opcua::{DataValue, NodeAttributes, NodeId};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{parse_nodes, Connection};
use crate::cli::{AttributesArgs, Cli, OutputFormat, ReadArgs};
use crate::error::{CliError, CliResult};

/// One read result as printed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ValueReport {
    node_id: String,
    value: String,
    kind: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_timestamp: Option<DateTime<Utc>>,
}

impl ValueReport {
    fn new(node_id: &NodeId, value: &DataValue) -> Self {
        Self {
            node_id: node_id.to_string(),
            value: format_value(&value.value),
            kind: value.value.data_type().map(|kind| kind.to_string()),
            status: value.status.to_string(),
            source_timestamp: value.source_timestamp,
        }
    }
}

/// Executes the `read` command.
///
/// All nodes go out in one batch; a node with a bad status is reported in
/// place rather than failing the command.
pub async fn read(cli: &Cli, args: &ReadArgs) -> CliResult<()> {
    let nodes = parse_nodes(&args.nodes)?;

    let connection = Connection::open(cli).await?;
    let values = connection.client.values().read_values(&nodes).await;
    let closed = connection.close().await;

    let reports: Vec<ValueReport> = nodes
        .iter()
        .zip(values?.iter())
        .map(|(node, value)| ValueReport::new(node, value))
        .collect();
    print!("{}", render_reports(&reports, args.format)?);
    closed
}

/// Renders read results in `format`.
pub(crate) fn render_reports(reports: &[ValueReport], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Text => Ok(reports
            .iter()
            .map(|r| match &r.kind {
                Some(kind) => format!("{} = {} ({}) [{}]\n", r.node_id, r.value, kind, r.status),
                None => format!("{} = {} [{}]\n", r.node_id, r.value, r.status),
            })
            .collect()),
        OutputFormat::Json => serde_json::to_string_pretty(reports)
            .map(|json| json + "\n")
            .map_err(|e| CliError::io(e.to_string())),
        OutputFormat::Yaml => serde_yaml::to_string(reports).map_err(|e| CliError::io(e.to_string())),
    }
}

/// Executes the `attributes` command.
pub async fn attributes(cli: &Cli, args: &AttributesArgs) -> CliResult<()> {
    let nodes = parse_nodes(&args.nodes)?;

    let connection = Connection::open(cli).await?;
    let attributes = connection.client.values().read_attributes(&nodes).await;
    let closed = connection.close().await;

    for node in attributes? {
        print!("{}", render_attributes(&node));
    }
    closed
}

/// Renders one node's attribute set as an indented block.
pub(crate) fn render_attributes(node: &NodeAttributes) -> String {
    let unknown = || "-".to_string();
    let value = if node.value.is_good() {
        format_value(&node.value.value)
    } else {
        format!("[{}]", node.value.status)
    };

    format!(
        "{}\n  NodeClass:   {}\n  DisplayName: {}\n  Description: {}\n  Value:       {}\n  AccessLevel: {}\n",
        node.node_id,
        node.node_class.map(|c| c.to_string()).unwrap_or_else(unknown),
        node.display_name.clone().unwrap_or_else(unknown),
        node.description.clone().filter(|d| !d.is_empty()).unwrap_or_else(unknown),
        value,
        node.access_level
            .map(|level| level.description())
            .unwrap_or_else(unknown),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhs_opcua::simulation::SimulatedServer;
    use bhs_opcua::{OpcUaClient, OpcUaConfig, OpcUaValue, StatusCode};

    fn report(value: OpcUaValue) -> ValueReport {
        ValueReport::new(&NodeId::string(2, "A"), &DataValue::good(value))
    }

    #[test]
    fn test_render_text() {
        let reports = vec![
            report(OpcUaValue::Int32(42)),
            ValueReport::new(
                &NodeId::string(2, "B"),
                &DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN),
            ),
        ];
        let text = render_reports(&reports, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("ns=2;s=A = 42 (Int32)"));
        assert!(lines[1].starts_with("ns=2;s=B =  ["));
    }

    #[test]
    fn test_render_json() {
        let json = render_reports(&[report(OpcUaValue::Boolean(true))], OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["node_id"], "ns=2;s=A");
        assert_eq!(parsed[0]["value"], "true");
        assert_eq!(parsed[0]["kind"], "Boolean");
    }

    #[test]
    fn test_render_yaml() {
        let yaml = render_reports(&[report(OpcUaValue::from("hi"))], OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("node_id: ns=2;s=A"));
        assert!(yaml.contains("value: hi"));
    }

    #[tokio::test]
    async fn test_render_attributes_of_variable_and_folder() {
        let server = SimulatedServer::plant();
        let client = OpcUaClient::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
        client.connect().await.unwrap();

        let nodes = [
            NodeId::string(2, "Plant.Line1.Count"),
            NodeId::string(2, "Plant.Line1"),
        ];
        let attributes = client.values().read_attributes(&nodes).await.unwrap();

        let count = render_attributes(&attributes[0]);
        assert!(count.contains("NodeClass:   Variable"));
        assert!(count.contains("DisplayName: Count"));
        assert!(count.contains("Value:       0"));
        assert!(count.contains("CurrentRead"));

        let line = render_attributes(&attributes[1]);
        assert!(line.contains("NodeClass:   Object"));
        assert!(line.contains("AccessLevel: -"));
    }
}
