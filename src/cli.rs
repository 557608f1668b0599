// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;
use crate::identity::ParamValue;

/// Command-line arguments for `datadag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "datadag",
    version,
    about = "Inspect and administer a datadag dataset store.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Filesystem store root; overrides `[store]` and skips the config file.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DATADAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List dataset names matching a regex anchored at the start of the name.
    Find {
        pattern: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// List datasets called NAME whose parameters match every filter.
    Scan {
        name: String,
        /// `key=value`; dotted keys reach into predecessors.
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
    },
    /// Print one dataset's identity and stored time ranges.
    Show {
        name: String,
        hash: u64,
        #[arg(long)]
        version: String,
    },
    /// List the immediate successors of a dataset.
    Successors {
        name: String,
        hash: u64,
        #[arg(long)]
        version: String,
    },
    /// Delete a dataset; `--recursive` also removes its successors.
    Delete {
        name: String,
        hash: u64,
        #[arg(long)]
        version: String,
        #[arg(long)]
        recursive: bool,
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

fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((key.to_string(), ParamValue::parse_loose(value)))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
