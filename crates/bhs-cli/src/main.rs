// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `bhs-opc` - OPC UA client command line.

use bhs_cli::commands::execute;
use bhs_cli::error::report_error;
use bhs_cli::{init_logging, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.effective_log_level(), cli.log_format);

    if let Err(error) = execute(cli).await {
        report_error(&error);
        std::process::exit(error.exit_code());
    }

    Ok(())
}
