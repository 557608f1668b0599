// src/identity/metadata.rs

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{DatadagError, Result};
use crate::identity::hash::CanonicalEncoder;
use crate::identity::params::{ParamValue, Params, encode_params, normalize_params};
use crate::persistence::{EngineState, create_engine};

/// Version used when a dataset does not declare one.
pub const DEFAULT_VERSION: &str = "no_version";

/// Level of the time axis inside a multi-level index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeLevel {
    Index(i64),
    Name(String),
}

impl TimeLevel {
    fn encode(level: Option<&TimeLevel>, enc: &mut CanonicalEncoder) {
        match level {
            None => enc.null(),
            Some(TimeLevel::Index(i)) => enc.int(*i),
            Some(TimeLevel::Name(n)) => enc.str(n),
        };
    }
}

impl fmt::Display for TimeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeLevel::Index(i) => write!(f, "{i}"),
            TimeLevel::Name(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug)]
enum Lineage {
    /// Predecessors are held in full, sorted by edge name.
    Resolved(BTreeMap<String, DatasetMetadata>),
    /// Only the hash is known; predecessors are fetched from the owning engine.
    Stub,
}

#[derive(Debug)]
struct MetadataInner {
    name: String,
    is_static: bool,
    version: String,
    time_level: Option<TimeLevel>,
    params: Params,
    engine: EngineState,
    lineage: Lineage,
    hash: u64,
}

/// Content-addressed identity of a dataset.
///
/// The hash covers name, static flag, time level, version, engine state,
/// parameters and the hashes of the predecessors (in edge-name order). Time
/// ranges never contribute. Cloning is cheap; the identity is immutable.
#[derive(Clone)]
pub struct DatasetMetadata {
    inner: Arc<MetadataInner>,
}

/// Builder for [`DatasetMetadata`].
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    name: String,
    is_static: bool,
    version: String,
    time_level: Option<TimeLevel>,
    params: Params,
    engine: EngineState,
    predecessors: BTreeMap<String, DatasetMetadata>,
}

impl MetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            version: DEFAULT_VERSION.to_string(),
            time_level: None,
            params: Params::new(),
            engine: EngineState::Memory,
            predecessors: BTreeMap::new(),
        }
    }

    pub fn is_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn time_level(mut self, level: Option<TimeLevel>) -> Self {
        self.time_level = level;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn engine(mut self, engine: EngineState) -> Self {
        self.engine = engine;
        self
    }

    pub fn predecessor(mut self, edge: impl Into<String>, metadata: DatasetMetadata) -> Self {
        self.predecessors.insert(edge.into(), metadata);
        self
    }

    pub fn predecessors(mut self, predecessors: BTreeMap<String, DatasetMetadata>) -> Self {
        self.predecessors.extend(predecessors);
        self
    }

    fn check(&self) -> Result<()> {
        if self.is_static && self.time_level.is_some() {
            return Err(DatadagError::InvalidDeclaration(format!(
                "static dataset '{}' cannot declare a time level",
                self.name
            )));
        }
        if self.name.is_empty() {
            return Err(DatadagError::InvalidDeclaration(
                "dataset name must not be empty".to_string(),
            ));
        }
        if let Some(key) = self.params.iter().find_map(|(k, v)| (!v.is_finite()).then_some(k)) {
            return Err(DatadagError::InvalidDeclaration(format!(
                "parameter '{key}' of dataset '{}' holds a non-finite float",
                self.name
            )));
        }
        Ok(())
    }

    pub fn build(self) -> Result<DatasetMetadata> {
        self.check()?;
        let params = normalize_params(self.params);
        let hash = compute_hash(
            &self.name,
            self.is_static,
            self.time_level.as_ref(),
            &self.version,
            &self.engine,
            &params,
            self.predecessors.values().map(DatasetMetadata::hash),
        );
        Ok(DatasetMetadata {
            inner: Arc::new(MetadataInner {
                name: self.name,
                is_static: self.is_static,
                version: self.version,
                time_level: self.time_level,
                params,
                engine: self.engine,
                lineage: Lineage::Resolved(self.predecessors),
                hash,
            }),
        })
    }

    /// Identity known only by its stored hash; predecessors resolve lazily.
    pub(crate) fn build_stub(self, hash: u64) -> Result<DatasetMetadata> {
        self.check()?;
        Ok(DatasetMetadata {
            inner: Arc::new(MetadataInner {
                name: self.name,
                is_static: self.is_static,
                version: self.version,
                time_level: self.time_level,
                params: normalize_params(self.params),
                engine: self.engine,
                lineage: Lineage::Stub,
                hash,
            }),
        })
    }
}

fn compute_hash(
    name: &str,
    is_static: bool,
    time_level: Option<&TimeLevel>,
    version: &str,
    engine: &EngineState,
    params: &Params,
    predecessor_hashes: impl Iterator<Item = u64>,
) -> u64 {
    let mut enc = CanonicalEncoder::new();
    enc.str(name).bool(is_static);
    TimeLevel::encode(time_level, &mut enc);
    enc.str(version);
    engine.encode(&mut enc);
    encode_params(params, &mut enc);
    for hash in predecessor_hashes {
        enc.hash(hash);
    }
    enc.finish()
}

impl DatasetMetadata {
    pub fn builder(name: impl Into<String>) -> MetadataBuilder {
        MetadataBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_static(&self) -> bool {
        self.inner.is_static
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn time_level(&self) -> Option<&TimeLevel> {
        self.inner.time_level.as_ref()
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    pub fn engine(&self) -> &EngineState {
        &self.inner.engine
    }

    pub fn hash(&self) -> u64 {
        self.inner.hash
    }

    pub fn is_stub(&self) -> bool {
        matches!(self.inner.lineage, Lineage::Stub)
    }

    /// Predecessors by edge name, fetched from the owning engine for stubs.
    pub fn predecessors(&self) -> Result<BTreeMap<String, DatasetMetadata>> {
        match &self.inner.lineage {
            Lineage::Resolved(map) => Ok(map.clone()),
            Lineage::Stub => {
                let engine = create_engine(&self.inner.engine)?;
                engine.predecessors_from_hash(self.name(), self.version(), self.hash())
            }
        }
    }

    pub fn is_immediate_predecessor(&self, other: &DatasetMetadata) -> Result<bool> {
        Ok(self.predecessors()?.values().any(|p| p == other))
    }

    /// Same identity with the lineage dropped.
    pub fn to_stub(&self) -> DatasetMetadata {
        DatasetMetadata {
            inner: Arc::new(MetadataInner {
                name: self.inner.name.clone(),
                is_static: self.inner.is_static,
                version: self.inner.version.clone(),
                time_level: self.inner.time_level.clone(),
                params: self.inner.params.clone(),
                engine: self.inner.engine.clone(),
                lineage: Lineage::Stub,
                hash: self.inner.hash,
            }),
        }
    }

    /// Rebuild this identity (and its whole lineage) for another engine.
    pub fn with_engine(&self, engine: &EngineState) -> Result<DatasetMetadata> {
        let predecessors = self
            .predecessors()?
            .into_iter()
            .map(|(edge, m)| Ok((edge, m.with_engine(engine)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        MetadataBuilder::new(self.name())
            .is_static(self.is_static())
            .version(self.version())
            .time_level(self.time_level().cloned())
            .params(self.params().clone())
            .engine(engine.clone())
            .predecessors(predecessors)
            .build()
    }

    /// Value of a parameter or of one of the reserved fields `name`,
    /// `version`, `static` and `time_level`.
    pub fn parameter_value(&self, key: &str) -> Result<ParamValue> {
        let value = match key {
            "name" => ParamValue::Str(self.inner.name.clone()),
            "version" => ParamValue::Str(self.inner.version.clone()),
            "static" => ParamValue::Bool(self.inner.is_static),
            "time_level" => match &self.inner.time_level {
                None => ParamValue::Null,
                Some(TimeLevel::Index(i)) => ParamValue::Int(*i),
                Some(TimeLevel::Name(n)) => ParamValue::Str(n.clone()),
            },
            other => self.inner.params.get(other).cloned().ok_or_else(|| {
                DatadagError::UnknownParameter {
                    dataset: self.inner.name.clone(),
                    param: other.to_string(),
                }
            })?,
        };
        Ok(value)
    }

    /// Resolve a dotted path: every segment but the last names a predecessor
    /// edge, so `upstream.window` is the `window` parameter of the dataset
    /// behind edge `upstream`.
    pub fn parameter_value_at(&self, path: &str) -> Result<ParamValue> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or(path);
        let mut target = self.clone();
        for edge in segments {
            let next = target.predecessors()?.remove(edge).ok_or_else(|| {
                DatadagError::UnknownParameter {
                    dataset: target.name().to_string(),
                    param: path.to_string(),
                }
            })?;
            target = next;
        }
        target.parameter_value(last)
    }
}

impl PartialEq for DatasetMetadata {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.hash == other.inner.hash
                && self.inner.name == other.inner.name
                && self.inner.version == other.inner.version
                && self.inner.is_static == other.inner.is_static
                && self.inner.time_level == other.inner.time_level
                && self.inner.engine == other.inner.engine
                && self.inner.params == other.inner.params)
    }
}

impl Eq for DatasetMetadata {}

impl Hash for DatasetMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.hash);
    }
}

impl fmt::Debug for DatasetMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetMetadata")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .field("static", &self.inner.is_static)
            .field("hash", &self.inner.hash)
            .field("stub", &self.is_stub())
            .finish()
    }
}

impl fmt::Display for DatasetMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (version {}, h{})",
            self.inner.name, self.inner.version, self.inner.hash
        )
    }
}
