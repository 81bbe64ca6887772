// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::CliResult;

/// Executes the `version` command to display version information.
pub fn version(cli: &Cli) -> CliResult<()> {
    if cli.quiet {
        println!("{}", crate::VERSION);
        return Ok(());
    }

    println!("bhs-opc - OPC UA client command line");
    println!();
    println!("Version Information:");
    println!("  bhs-cli:   {}", crate::VERSION);
    println!("  bhs-opcua: {}", bhs_opcua::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:    {}", std::env::consts::ARCH);
    println!("  OS:        {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
