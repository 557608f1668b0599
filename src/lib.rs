// src/lib.rs

pub mod cli;
pub mod completion;
pub mod config;
pub mod dag;
pub mod data;
pub mod errors;
pub mod identity;
pub mod logging;
pub mod persistence;
pub mod runner;
pub mod task;
pub mod time;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::StoreKind;
use crate::config::loader::load_and_validate;
use crate::identity::{DatasetMetadata, Params};
use crate::persistence::filesystem::FileSystemEngine;
use crate::persistence::{PersistenceEngine, SharedEngine};

/// High-level entry point used by `main.rs`.
///
/// Opens the configured store and runs one administration command against
/// it. Results go to stdout, logs to stderr.
pub fn run(args: CliArgs) -> Result<()> {
    let engine = open_store(&args)?;
    debug!(store = %engine.state(), "opened store");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Find { pattern, version } => {
            for name in engine.find(&pattern, version.as_deref())? {
                writeln!(out, "{name}")?;
            }
        }
        Command::Scan { name, params } => {
            let filter: Params = params.into_iter().collect();
            for metadata in engine.scan(&name, &filter)? {
                writeln!(out, "{metadata}")?;
            }
        }
        Command::Show {
            name,
            hash,
            version,
        } => {
            let metadata = engine.metadata_from_hash(&name, &version, hash)?;
            print_metadata(&mut out, &*engine, &metadata)?;
        }
        Command::Successors {
            name,
            hash,
            version,
        } => {
            let metadata = engine.metadata_from_hash(&name, &version, hash)?;
            for successor in engine.find_successors(&metadata)? {
                writeln!(out, "{successor}")?;
            }
        }
        Command::Delete {
            name,
            hash,
            version,
            recursive,
        } => {
            let metadata = engine.metadata_from_hash(&name, &version, hash)?;
            if engine.delete(&metadata, recursive)? {
                info!(dataset = %metadata, "delete finished");
                writeln!(out, "deleted {metadata}")?;
            } else {
                writeln!(out, "nothing to delete for {metadata}")?;
            }
        }
    }

    Ok(())
}

/// The CLI only administers stores that outlive the process.
fn open_store(args: &CliArgs) -> Result<SharedEngine> {
    if let Some(root) = &args.root {
        return Ok(Arc::new(FileSystemEngine::new(root.clone())));
    }
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if cfg.store.kind != StoreKind::Filesystem {
        bail!(
            "{} configures an in-memory store, which cannot be administered from the command line",
            args.config.display()
        );
    }
    Ok(cfg.build_engine())
}

fn print_metadata(
    out: &mut impl Write,
    engine: &dyn PersistenceEngine,
    metadata: &DatasetMetadata,
) -> Result<()> {
    writeln!(out, "{metadata}")?;
    writeln!(out, "  static: {}", metadata.is_static())?;
    if let Some(level) = metadata.time_level() {
        writeln!(out, "  time_level: {level}")?;
    }
    writeln!(out, "  engine: {}", metadata.engine())?;
    for (key, value) in metadata.params() {
        writeln!(out, "  param {key} = {value}")?;
    }
    for (edge, predecessor) in metadata.predecessors()? {
        writeln!(out, "  input {edge}: {predecessor}")?;
    }
    if !metadata.is_static() {
        if let Some(range) = engine.get_declared_time_range(metadata)? {
            writeln!(out, "  declared: {range}")?;
        }
        if let Some(range) = engine.get_data_time_range(metadata)? {
            writeln!(out, "  data: {range}")?;
        }
    }
    Ok(())
}
