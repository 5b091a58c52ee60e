// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::errors::{QcError, Result};
use crate::repository::Metadata;

/// Command-line arguments for `qcflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "qcflow",
    version,
    about = "Run quality-control tasks and checks on monitoring data.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$QCFLOW_CONFIG`, else `qcflow.toml` in the current
    /// working directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `QCFLOW_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one task until stopped (Ctrl-C) or until its cycle budget is spent.
    RunTask {
        /// Task name, i.e. the `<name>` of `[tasks.<name>]`.
        #[arg(long, value_name = "NAME")]
        task: String,

        /// Stop after this many cycles; overrides `maxCycles`.
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
    },

    /// Evaluate configured checks on the latest stored objects of a task.
    RunChecker {
        /// Task whose published objects are checked.
        #[arg(long, value_name = "NAME")]
        task: String,

        /// Only run this check (default: every check on the task).
        #[arg(long, value_name = "NAME")]
        check: Option<String>,
    },

    /// Print registered modules, task and check classes, payload classes.
    Info,

    /// Add or override metadata on the latest stored version of an object.
    MetadataUpdate {
        /// Repository path, e.g. `qc/TST/MO/skeleton`.
        #[arg(long, value_name = "PATH")]
        path: String,

        /// Object name under `path`.
        #[arg(long, value_name = "NAME")]
        name: String,

        /// `key=value` pairs.
        #[arg(value_name = "KEY=VALUE", required = true)]
        entries: Vec<String>,
    },
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse `key=value` arguments into a metadata map.
pub fn parse_metadata_entries(entries: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| QcError::ConfigError(format!("expected KEY=VALUE, got `{entry}`")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(QcError::ConfigError(format!("empty metadata key in `{entry}`")));
        }
        metadata.insert(key.to_string(), value.trim().to_string());
    }
    Ok(metadata)
}
