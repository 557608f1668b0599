// src/persistence/filesystem.rs

//! Plain-filesystem engine.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<version>/metadata/<name>_h<hash>.meta   JSON metadata record
//! <root>/<version>/datafiles/<name>_h<hash>.data  JSON payload
//! ```
//!
//! Reads hold a shared lock and writes an exclusive lock on the metadata
//! file. The root path is part of every identity stored here, so the same
//! store should always be opened through the same path.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use crate::data::{Dataset, Payload};
use crate::errors::{DatadagError, Result};
use crate::identity::{DatasetMetadata, Params};
use crate::persistence::record::MetadataRecord;
use crate::persistence::{
    EngineState, PersistenceEngine, matches_filter, name_matcher, restrict_dataset,
};
use crate::time::TimeRange;

const METADATA_DIR: &str = "metadata";
const DATA_DIR: &str = "datafiles";
const METADATA_EXT: &str = "meta";
const DATA_EXT: &str = "data";

#[derive(Debug, Clone)]
pub struct FileSystemEngine {
    root: PathBuf,
}

fn file_stem(name: &str, hash: u64) -> String {
    format!("{name}_h{hash}")
}

/// Split `<name>_h<hash>` back into its parts.
fn parse_stem(stem: &str) -> Option<(&str, u64)> {
    let (name, hash) = stem.rsplit_once("_h")?;
    Some((name, hash.parse().ok()?))
}

fn metadata_glob() -> Result<GlobMatcher> {
    let glob = Glob::new(&format!("*.{METADATA_EXT}"))
        .map_err(|e| DatadagError::Other(anyhow::Error::new(e)))?;
    Ok(glob.compile_matcher())
}

impl FileSystemEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, name: &str, version: &str, hash: u64) -> PathBuf {
        self.root
            .join(version)
            .join(METADATA_DIR)
            .join(format!("{}.{METADATA_EXT}", file_stem(name, hash)))
    }

    fn data_path(&self, name: &str, version: &str, hash: u64) -> PathBuf {
        self.root
            .join(version)
            .join(DATA_DIR)
            .join(format!("{}.{DATA_EXT}", file_stem(name, hash)))
    }

    fn paths_of(&self, metadata: &DatasetMetadata) -> (PathBuf, PathBuf) {
        (
            self.metadata_path(metadata.name(), metadata.version(), metadata.hash()),
            self.data_path(metadata.name(), metadata.version(), metadata.hash()),
        )
    }

    /// Read a record and its payload under a shared lock.
    fn load(&self, meta_path: &Path, data_path: &Path) -> Result<Option<(MetadataRecord, Payload)>> {
        let mut meta_file = match File::open(meta_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        meta_file
            .lock_shared()
            .with_context(|| format!("locking {meta_path:?} for reading"))?;

        let mut text = String::new();
        meta_file
            .read_to_string(&mut text)
            .with_context(|| format!("reading metadata record {meta_path:?}"))?;
        let record: MetadataRecord = serde_json::from_str(&text)?;

        let raw = fs::read(data_path).with_context(|| format!("reading data file {data_path:?}"))?;
        let payload: Payload = serde_json::from_slice(&raw)?;

        meta_file.unlock()?;
        Ok(Some((record, payload)))
    }

    fn load_record(&self, meta_path: &Path) -> Result<MetadataRecord> {
        let mut meta_file =
            File::open(meta_path).with_context(|| format!("opening {meta_path:?}"))?;
        meta_file
            .lock_shared()
            .with_context(|| format!("locking {meta_path:?} for reading"))?;
        let mut text = String::new();
        meta_file.read_to_string(&mut text)?;
        meta_file.unlock()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn version_dirs(&self, version: Option<&str>) -> Result<Vec<PathBuf>> {
        if let Some(v) = version {
            return Ok(vec![self.root.join(v)]);
        }
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Every metadata file under the given version (or all versions).
    fn metadata_files(&self, version: Option<&str>) -> Result<Vec<PathBuf>> {
        let matcher = metadata_glob()?;
        let mut files = Vec::new();
        for dir in self.version_dirs(version)? {
            let meta_dir = dir.join(METADATA_DIR);
            let entries = match fs::read_dir(&meta_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let path = entry?.path();
                let is_meta = path
                    .file_name()
                    .map(|n| matcher.is_match(Path::new(n)))
                    .unwrap_or(false);
                if is_meta {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn records(&self, version: Option<&str>) -> Result<Vec<MetadataRecord>> {
        let mut records = Vec::new();
        for path in self.metadata_files(version)? {
            match self.load_record(&path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    // A concurrent delete can remove the file between listing and reading.
                    if path.exists() {
                        return Err(err);
                    }
                    warn!(path = ?path, "metadata file vanished while listing");
                }
            }
        }
        Ok(records)
    }
}

impl PersistenceEngine for FileSystemEngine {
    fn state(&self) -> EngineState {
        EngineState::FileSystem {
            root: self.root.clone(),
        }
    }

    fn exists(&self, metadata: &DatasetMetadata) -> Result<bool> {
        let (meta_path, _) = self.paths_of(metadata);
        Ok(meta_path.is_file())
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
        let (meta_path, data_path) = self.paths_of(metadata);
        let Some((record, payload)) = self.load(&meta_path, &data_path)? else {
            return Ok(None);
        };
        if record.hash() != metadata.hash() {
            return Err(DatadagError::InvalidDeclaration(format!(
                "metadata file {meta_path:?} records hash {} but was addressed as {}",
                record.hash(),
                metadata.hash()
            )));
        }
        let dataset = Dataset::new(metadata.clone(), payload, record.declared_time_range)?;
        restrict_dataset(dataset, time_range).map(Some)
    }

    fn replace(&self, dataset: &Dataset) -> Result<bool> {
        let metadata = dataset.metadata();
        let (meta_path, data_path) = self.paths_of(metadata);
        for dir in [meta_path.parent(), data_path.parent()].into_iter().flatten() {
            fs::create_dir_all(dir).with_context(|| format!("creating directory {dir:?}"))?;
        }

        let record = MetadataRecord::from_dataset(dataset)?;
        let existed = meta_path.is_file();

        let mut meta_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&meta_path)
            .with_context(|| format!("opening {meta_path:?} for writing"))?;
        meta_file
            .lock()
            .with_context(|| format!("locking {meta_path:?} for writing"))?;

        let payload = serde_json::to_vec(dataset.data())?;
        fs::write(&data_path, payload).with_context(|| format!("writing {data_path:?}"))?;

        let text = serde_json::to_string_pretty(&record)?;
        meta_file.set_len(0)?;
        meta_file.write_all(text.as_bytes())?;
        meta_file.flush()?;
        meta_file.unlock()?;

        debug!(
            dataset = %metadata,
            path = ?meta_path,
            overwritten = existed,
            "stored dataset on disk"
        );
        Ok(existed)
    }

    fn delete_leaf(&self, metadata: &DatasetMetadata) -> Result<bool> {
        let (meta_path, data_path) = self.paths_of(metadata);
        let meta_file = match OpenOptions::new().write(true).open(&meta_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        meta_file
            .lock()
            .with_context(|| format!("locking {meta_path:?} for deletion"))?;
        if data_path.exists() {
            fs::remove_file(&data_path)?;
        }
        fs::remove_file(&meta_path)?;
        meta_file.unlock()?;
        Ok(true)
    }

    fn find_successors(&self, metadata: &DatasetMetadata) -> Result<Vec<DatasetMetadata>> {
        let mut successors = Vec::new();
        for record in self.records(None)? {
            if record.predecessor_hashes().any(|h| h == metadata.hash()) {
                successors.push(record.to_metadata()?);
            }
        }
        successors.sort_by(|a, b| (a.name(), a.hash()).cmp(&(b.name(), b.hash())));
        Ok(successors)
    }

    fn find(&self, pattern: &str, version: Option<&str>) -> Result<Vec<String>> {
        let matcher = name_matcher(pattern)?;
        let mut names = BTreeSet::new();
        for path in self.metadata_files(version)? {
            let Some((name, _)) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(parse_stem)
            else {
                continue;
            };
            if matcher.is_match(name) {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    fn scan(&self, name: &str, filter: &Params) -> Result<Vec<DatasetMetadata>> {
        let mut matched = Vec::new();
        for path in self.metadata_files(None)? {
            let named = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(parse_stem)
                .is_some_and(|(n, _)| n == name);
            if !named {
                continue;
            }
            let metadata = self.load_record(&path)?.to_metadata()?;
            if matches_filter(&metadata, filter)? {
                matched.push(metadata);
            }
        }
        matched.sort_by_key(DatasetMetadata::hash);
        Ok(matched)
    }

    fn metadata_from_hash(&self, name: &str, version: &str, hash: u64) -> Result<DatasetMetadata> {
        let path = self.metadata_path(name, version, hash);
        if !path.is_file() {
            return Err(DatadagError::NoMatchingDataset(format!(
                "{name} (version {version}, h{hash}) under {:?}",
                self.root
            )));
        }
        self.load_record(&path)?.to_metadata()
    }

    fn predecessors_from_hash(
        &self,
        name: &str,
        version: &str,
        hash: u64,
    ) -> Result<BTreeMap<String, DatasetMetadata>> {
        self.metadata_from_hash(name, version, hash)?.predecessors()
    }
}
