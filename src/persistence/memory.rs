// src/persistence/memory.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::data::Dataset;
use crate::errors::{DatadagError, Result};
use crate::identity::{DatasetMetadata, Params};
use crate::persistence::{
    EngineState, PersistenceEngine, matches_filter, name_matcher, restrict_dataset,
};
use crate::time::TimeRange;

/// Process-local engine keyed by identity hash.
///
/// Holds full identities, so predecessors never need resolving. Used in tests
/// and single-process pipelines.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    datasets: RwLock<HashMap<u64, Dataset>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<u64, Dataset>> {
        self.datasets.read().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("memory engine lock poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<u64, Dataset>> {
        self.datasets.write().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("memory engine lock poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }
}

impl PersistenceEngine for MemoryEngine {
    fn state(&self) -> EngineState {
        EngineState::Memory
    }

    fn exists(&self, metadata: &DatasetMetadata) -> Result<bool> {
        Ok(self.read_map().contains_key(&metadata.hash()))
    }

    fn get_dataset(
        &self,
        metadata: &DatasetMetadata,
        time_range: Option<&TimeRange>,
    ) -> Result<Option<Dataset>> {
        if metadata.is_static() && time_range.is_some() {
            return Err(DatadagError::UnsupportedOperation(format!(
                "static dataset '{}' cannot be read by time range",
                metadata.name()
            )));
        }
        let stored = self.read_map().get(&metadata.hash()).cloned();
        stored
            .map(|ds| restrict_dataset(ds, time_range))
            .transpose()
    }

    fn replace(&self, dataset: &Dataset) -> Result<bool> {
        let hash = dataset.metadata().hash();
        let previous = self.write_map().insert(hash, dataset.clone());
        debug!(
            dataset = %dataset.metadata(),
            overwritten = previous.is_some(),
            "stored dataset in memory"
        );
        Ok(previous.is_some())
    }

    fn delete_leaf(&self, metadata: &DatasetMetadata) -> Result<bool> {
        Ok(self.write_map().remove(&metadata.hash()).is_some())
    }

    fn find_successors(&self, metadata: &DatasetMetadata) -> Result<Vec<DatasetMetadata>> {
        let candidates: Vec<DatasetMetadata> = self
            .read_map()
            .values()
            .map(|ds| ds.metadata().clone())
            .collect();
        let mut successors = Vec::new();
        for candidate in candidates {
            if candidate.is_immediate_predecessor(metadata)? {
                successors.push(candidate);
            }
        }
        successors.sort_by(|a, b| (a.name(), a.hash()).cmp(&(b.name(), b.hash())));
        Ok(successors)
    }

    fn find(&self, pattern: &str, version: Option<&str>) -> Result<Vec<String>> {
        let matcher = name_matcher(pattern)?;
        let names: BTreeSet<String> = self
            .read_map()
            .values()
            .map(Dataset::metadata)
            .filter(|m| version.is_none_or(|v| m.version() == v))
            .filter(|m| matcher.is_match(m.name()))
            .map(|m| m.name().to_string())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn scan(&self, name: &str, filter: &Params) -> Result<Vec<DatasetMetadata>> {
        let candidates: Vec<DatasetMetadata> = self
            .read_map()
            .values()
            .map(Dataset::metadata)
            .filter(|m| m.name() == name)
            .cloned()
            .collect();
        let mut matched = Vec::new();
        for candidate in candidates {
            if matches_filter(&candidate, filter)? {
                matched.push(candidate);
            }
        }
        matched.sort_by_key(DatasetMetadata::hash);
        Ok(matched)
    }

    fn metadata_from_hash(&self, name: &str, version: &str, hash: u64) -> Result<DatasetMetadata> {
        self.read_map()
            .get(&hash)
            .map(|ds| ds.metadata().clone())
            .filter(|m| m.name() == name && m.version() == version)
            .ok_or_else(|| {
                DatadagError::NoMatchingDataset(format!(
                    "{name} (version {version}, h{hash})"
                ))
            })
    }
}
