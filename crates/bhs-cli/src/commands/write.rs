// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `write` command.

use std::str::FromStr;

use bhs_opcua::client::conversion::format_value;
use bhs_opcua::NodeId;
use tracing::info;

use super::Connection;
use crate::cli::{Cli, WriteArgs};
use crate::error::{CliError, CliResult};

/// Executes the `write` command.
///
/// The node is read first so the text is parsed as the kind it holds; the
/// value is then written and read back.
pub async fn write(cli: &Cli, args: &WriteArgs) -> CliResult<()> {
    let node = NodeId::from_str(&args.node)?;

    let connection = Connection::open(cli).await?;
    let result = async {
        if !connection.client.values().is_writable(&node).await? {
            info!(node_id = %node, "AccessLevel does not grant CurrentWrite, trying anyway");
        }
        let written = connection.client.write_text(&node, &args.value).await?;
        let readback = connection.client.values().read_value(&node).await?;
        Ok::<_, CliError>((written, readback))
    }
    .await;
    let closed = connection.close().await;

    let (written, readback) = result?;
    println!("{} <- {}", node, format_value(&written));
    println!("{} = {}", node, format_value(&readback.value));
    closed
}
