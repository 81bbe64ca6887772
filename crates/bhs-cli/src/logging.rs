// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging setup for the command line.
//!
//! Logs go to stderr so command output on stdout stays parseable.

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogFormat;

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides `level` when set. Calling this twice keeps the first
/// subscriber.
pub fn init_logging(level: &str, format: LogFormat) {
    let ansi = std::io::stderr().is_terminal();
    let builder = fmt()
        .with_env_filter(log_filter(level))
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.with_ansi(ansi).try_init(),
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(false).with_ansi(ansi).try_init(),
    };

    if let Err(e) = installed {
        eprintln!("bhs-opc: logging not initialized: {}", e);
    }
}

/// Builds the filter: `RUST_LOG` if present, `level` otherwise.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).as_str()))
}

/// Maps a level name to a [`Level`]; unknown names mean `INFO`.
pub fn parse_level(level: &str) -> Level {
    level
        .trim()
        .to_ascii_lowercase()
        .replace("warning", "warn")
        .parse()
        .unwrap_or(Level::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level(" warning "), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_every_level_makes_a_filter() {
        for level in ["trace", "debug", "info", "warn", "error", "bogus"] {
            let directive = parse_level(level).as_str().to_lowercase();
            assert!(EnvFilter::try_new(directive).is_ok());
        }
    }
}
