// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Level selection: the `--log-level` flag wins, then the
//! `PIPEWRIGHT_LOG` environment variable, then `info`. Everything goes
//! to stderr so that stdout stays clean for shell consumers of the
//! parameter output.
//!
//! Run state is carried as structured fields (`step = %name`,
//! `workspace = %id`) rather than targets, so targets are suppressed
//! from the output.

use std::str::FromStr;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level
        .map(Level::from)
        .or_else(env_level)
        .unwrap_or(Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// `tracing::Level` already parses the usual level names; anything
/// unrecognised in the environment falls through to the default.
fn env_level() -> Option<Level> {
    let raw = std::env::var("PIPEWRIGHT_LOG").ok()?;
    Level::from_str(raw.trim()).ok()
}
