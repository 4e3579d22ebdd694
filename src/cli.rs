// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pipewright`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipewright",
    version,
    about = "Orchestrate multi-stage image builds and tests on a cluster.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the configuration file (JSON).
    ///
    /// If not given, the `CONFIG_SPEC` environment variable is used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Path to a configuration file that overrides fields of the input
    /// configuration. Falls back to the `OVERRIDE_SPEC` environment variable.
    #[arg(long = "override", value_name = "PATH")]
    pub override_config: Option<String>,

    /// One or more targets to build. Only steps required for these targets
    /// are run. Empty means all steps.
    #[arg(long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Paths to template files attached as extra test stages.
    #[arg(long = "template", value_name = "PATH")]
    pub templates: Vec<String>,

    /// Directories whose files become opaque secrets in the workspace.
    #[arg(long = "secret-dir", value_name = "PATH")]
    pub secret_dirs: Vec<String>,

    /// Workspace (namespace) to run in. If the value contains `{id}` it is
    /// replaced with the derived input hash. Defaults to `ci-op-{id}`.
    #[arg(long, value_name = "NAME")]
    pub namespace: Option<String>,

    /// Namespace to read release builds from.
    #[arg(long, value_name = "NAME", default_value = "stable")]
    pub base_namespace: String,

    /// Delete the workspace after this much idle time, e.g. "10m" or "1h".
    /// Zero retains the workspace.
    #[arg(long = "delete-when-idle", value_name = "DURATION", default_value = "10m")]
    pub delete_when_idle: String,

    /// After all targets complete, publish the built images per the
    /// promotion configuration.
    #[arg(long)]
    pub promote: bool,

    /// If set, write per-run artifacts (JUnit results) into this directory.
    #[arg(long = "artifact-dir", value_name = "PATH")]
    pub artifact_dir: Option<String>,

    /// If set, write an env-compatible file with the job parameters.
    #[arg(long = "write-params", value_name = "PATH")]
    pub write_params: Option<String>,

    /// Print the steps that would run without executing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Populate the job descriptor from `ORG/NAME@REV`. If `JOB_SPEC` is
    /// set, only the refs are overwritten.
    #[arg(long = "git-ref", value_name = "ORG/NAME@REV")]
    pub git_ref: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEWRIGHT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse a human duration like "90s", "10m" or "2h" into a `Duration`.
///
/// A bare number is taken as seconds; "0" disables the feature.
pub fn parse_idle_duration(s: &str) -> Result<std::time::Duration, String> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    let secs = match unit.trim() {
        "s" | "" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => return Err(format!("invalid duration unit: {other:?} in {s:?}")),
    };
    Ok(std::time::Duration::from_secs(secs))
}
