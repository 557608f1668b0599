// src/persistence/mod.rs

//! Storage contract for datasets keyed by their identity.
//!
//! Backends implement the primitive operations of [`PersistenceEngine`]; the
//! combining writes (`append`, `merge`, `idempotent_insert`) and recursive
//! deletion are provided on top of them so every backend produces the same
//! results:
//!
//! - `append` keeps every existing row and adds only incoming rows after the
//!   last stored one.
//! - `merge` keeps existing cells, fills gaps from the incoming data and
//!   unions the declared ranges.

pub mod filesystem;
pub mod memory;
pub mod record;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{Dataset, Payload};
use crate::errors::{DatadagError, Result};
use crate::identity::hash::CanonicalEncoder;
use crate::identity::{DatasetMetadata, Params};
use crate::time::{TimeRange, resolution};

pub use filesystem::FileSystemEngine;
pub use memory::MemoryEngine;
pub use record::{MetadataRecord, StubRecord};

/// Reconstructible description of an engine.
///
/// Part of every dataset identity; two engines with equal state address the
/// same datasets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineState {
    Memory,
    FileSystem { root: PathBuf },
}

impl EngineState {
    pub(crate) fn encode(&self, enc: &mut CanonicalEncoder) {
        match self {
            EngineState::Memory => {
                enc.str("memory");
            }
            EngineState::FileSystem { root } => {
                enc.str("filesystem").str(&root.to_string_lossy());
            }
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Memory => write!(f, "memory"),
            EngineState::FileSystem { root } => write!(f, "filesystem:{}", root.display()),
        }
    }
}

/// Shared handle to an engine.
pub type SharedEngine = Arc<dyn PersistenceEngine>;

/// Reopen the engine described by `state`.
///
/// In-memory stores live only inside the process that created them and
/// cannot be reopened.
pub fn create_engine(state: &EngineState) -> Result<SharedEngine> {
    match state {
        EngineState::Memory => Err(DatadagError::UnsupportedOperation(
            "an in-memory engine cannot be recreated from its state".to_string(),
        )),
        EngineState::FileSystem { root } => Ok(Arc::new(FileSystemEngine::new(root.clone()))),
    }
}

pub trait PersistenceEngine: Send + Sync + fmt::Debug {
    fn state(&self) -> EngineState;

    fn exists(&self, metadata: &DatasetMetadata) -> Result<bool>;

    /// Stored dataset, restricted to `time_range` when given.
    fn get_dataset(
        &self,
        metadata: &DatasetMetadata,
        time_range: Option<&TimeRange>,
    ) -> Result<Option<Dataset>>;

    /// Unconditional overwrite; returns whether something was overwritten.
    fn replace(&self, dataset: &Dataset) -> Result<bool>;

    /// Remove a dataset that has no successors; returns whether it existed.
    fn delete_leaf(&self, metadata: &DatasetMetadata) -> Result<bool>;

    /// Immediate successors sorted by (name, hash).
    fn find_successors(&self, metadata: &DatasetMetadata) -> Result<Vec<DatasetMetadata>>;

    /// Sorted, deduplicated names matching `pattern` at the start of the name.
    fn find(&self, pattern: &str, version: Option<&str>) -> Result<Vec<String>>;

    /// Datasets named `name` whose parameters match every filter entry.
    /// Filter keys may be dotted predecessor paths.
    fn scan(&self, name: &str, filter: &Params) -> Result<Vec<DatasetMetadata>>;

    fn metadata_from_hash(&self, name: &str, version: &str, hash: u64) -> Result<DatasetMetadata>;

    fn predecessors_from_hash(
        &self,
        name: &str,
        version: &str,
        hash: u64,
    ) -> Result<BTreeMap<String, DatasetMetadata>> {
        self.metadata_from_hash(name, version, hash)?.predecessors()
    }

    fn read(
        &self,
        metadata: &DatasetMetadata,
        time_range: Option<&TimeRange>,
    ) -> Result<Option<Payload>> {
        Ok(self
            .get_dataset(metadata, time_range)?
            .map(Dataset::into_data))
    }

    fn get_data_time_range(&self, metadata: &DatasetMetadata) -> Result<Option<TimeRange>> {
        ensure_time_series(metadata, "get_data_time_range")?;
        Ok(self
            .get_dataset(metadata, None)?
            .and_then(|ds| ds.data_time_range()))
    }

    fn get_declared_time_range(&self, metadata: &DatasetMetadata) -> Result<Option<TimeRange>> {
        ensure_time_series(metadata, "get_declared_time_range")?;
        Ok(self
            .get_dataset(metadata, None)?
            .and_then(|ds| ds.declared_time_range()))
    }

    /// Insert unless present; returns whether the dataset already existed.
    fn idempotent_insert(&self, dataset: &Dataset) -> Result<bool> {
        if self.exists(dataset.metadata())? {
            debug!(dataset = %dataset.metadata(), "dataset already present; insert skipped");
            return Ok(true);
        }
        self.replace(dataset)?;
        Ok(false)
    }

    fn append(&self, dataset: &Dataset) -> Result<()> {
        ensure_time_series(dataset.metadata(), "append")?;
        match self.get_dataset(dataset.metadata(), None)? {
            None => {
                self.replace(dataset)?;
            }
            Some(existing) => {
                if let Some(combined) = append_datasets(&existing, dataset)? {
                    self.replace(&combined)?;
                }
            }
        }
        Ok(())
    }

    fn merge(&self, dataset: &Dataset) -> Result<()> {
        ensure_time_series(dataset.metadata(), "merge")?;
        let combined = match self.get_dataset(dataset.metadata(), None)? {
            None => dataset.clone(),
            Some(existing) => merge_datasets(&existing, dataset)?,
        };
        self.replace(&combined)?;
        Ok(())
    }

    /// Delete a dataset; with `recursive` its successors go first, depth first.
    fn delete(&self, metadata: &DatasetMetadata, recursive: bool) -> Result<bool> {
        let successors = self.find_successors(metadata)?;
        if !successors.is_empty() {
            if !recursive {
                return Err(DatadagError::HasSuccessors {
                    name: metadata.name().to_string(),
                    successors: successors.len(),
                });
            }
            for successor in &successors {
                self.delete(successor, true)?;
            }
        }
        let existed = self.delete_leaf(metadata)?;
        if existed {
            info!(dataset = %metadata, recursive, "deleted dataset");
        }
        Ok(existed)
    }
}

pub(crate) fn ensure_time_series(metadata: &DatasetMetadata, operation: &str) -> Result<()> {
    if metadata.is_static() {
        return Err(DatadagError::UnsupportedOperation(format!(
            "{operation} is not defined for static dataset '{}'",
            metadata.name()
        )));
    }
    Ok(())
}

/// Combine `incoming` onto the end of `existing`.
///
/// Returns `None` when `incoming` has no rows after the existing data, in
/// which case the stored dataset stays as it is.
pub fn append_datasets(existing: &Dataset, incoming: &Dataset) -> Result<Option<Dataset>> {
    ensure_time_series(existing.metadata(), "append")?;
    let (Some(old_frame), Some(new_frame)) = (existing.frame(), incoming.frame()) else {
        return Err(DatadagError::InvalidDeclaration(format!(
            "cannot append non-frame data to '{}'",
            existing.metadata().name()
        )));
    };
    let (Some(old_declared), Some(new_declared)) = (
        existing.declared_time_range(),
        incoming.declared_time_range(),
    ) else {
        return Err(DatadagError::InvalidDeclaration(format!(
            "time series dataset '{}' is missing a declared time range",
            existing.metadata().name()
        )));
    };

    let slice = match old_frame.last_index() {
        Some(last) => new_frame.after(last + resolution()),
        None => new_frame.clone(),
    };
    if slice.is_empty() {
        debug!(dataset = %existing.metadata(), "nothing new to append");
        return Ok(None);
    }

    let combined = old_frame.concat(&slice);
    let declared = TimeRange::new(
        old_declared.start(),
        old_declared.end().max(new_declared.end()),
    )?;
    debug!(
        dataset = %existing.metadata(),
        rows = slice.len(),
        declared = %declared,
        "appending rows"
    );
    existing.update(Payload::Frame(combined), Some(declared)).map(Some)
}

/// Combine two versions cell by cell; existing cells win.
pub fn merge_datasets(existing: &Dataset, incoming: &Dataset) -> Result<Dataset> {
    ensure_time_series(existing.metadata(), "merge")?;
    let (Some(old_frame), Some(new_frame)) = (existing.frame(), incoming.frame()) else {
        return Err(DatadagError::InvalidDeclaration(format!(
            "cannot merge non-frame data into '{}'",
            existing.metadata().name()
        )));
    };
    let (Some(old_declared), Some(new_declared)) = (
        existing.declared_time_range(),
        incoming.declared_time_range(),
    ) else {
        return Err(DatadagError::InvalidDeclaration(format!(
            "time series dataset '{}' is missing a declared time range",
            existing.metadata().name()
        )));
    };

    let declared = old_declared.union(&new_declared)?;
    let combined = old_frame.combine_first(new_frame);
    existing.update(Payload::Frame(combined), Some(declared))
}

/// Restrict a stored dataset to `range`.
pub(crate) fn restrict_dataset(dataset: Dataset, range: Option<&TimeRange>) -> Result<Dataset> {
    let Some(range) = range else {
        return Ok(dataset);
    };
    ensure_time_series(dataset.metadata(), "reading a time range")?;
    let declared = dataset.declared_time_range().ok_or_else(|| {
        DatadagError::InvalidDeclaration(format!(
            "time series dataset '{}' is missing a declared time range",
            dataset.metadata().name()
        ))
    })?;
    let narrowed = declared
        .intersection(range)
        .ok_or_else(|| DatadagError::NonOverlappingRequest {
            declared: declared.to_string(),
            requested: range.to_string(),
        })?;
    let frame = dataset
        .frame()
        .map(|f| f.view(range))
        .unwrap_or_default();
    dataset.update(Payload::Frame(frame), Some(narrowed))
}

/// Anchored name matcher used by `find`.
pub(crate) fn name_matcher(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
        DatadagError::InvalidDeclaration(format!("invalid name pattern '{pattern}': {e}"))
    })
}

/// Whether `metadata` matches every `(path, value)` filter entry.
///
/// A missing parameter or predecessor is a non-match, not an error.
pub(crate) fn matches_filter(metadata: &DatasetMetadata, filter: &Params) -> Result<bool> {
    for (path, expected) in filter {
        match metadata.parameter_value_at(path) {
            Ok(value) if value == *expected => {}
            Ok(_) | Err(DatadagError::UnknownParameter { .. }) => return Ok(false),
            Err(other) => return Err(other),
        }
    }
    Ok(true)
}
