// src/persistence/record.rs

//! Backend-agnostic persisted metadata record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::errors::{DatadagError, Result};
use crate::identity::{DatasetMetadata, MetadataBuilder, Params, TimeLevel};
use crate::persistence::EngineState;
use crate::time::TimeRange;

/// Top-level fields of an identity plus its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubRecord {
    pub name: String,
    pub hash: u64,
    pub time_level: Option<TimeLevel>,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub version: String,
    pub params: Params,
    pub engine: EngineState,
}

impl StubRecord {
    pub fn from_metadata(metadata: &DatasetMetadata) -> Self {
        Self {
            name: metadata.name().to_string(),
            hash: metadata.hash(),
            time_level: metadata.time_level().cloned(),
            is_static: metadata.is_static(),
            version: metadata.version().to_string(),
            params: metadata.params().clone(),
            engine: metadata.engine().clone(),
        }
    }

    fn builder(&self) -> MetadataBuilder {
        MetadataBuilder::new(self.name.clone())
            .is_static(self.is_static)
            .version(self.version.clone())
            .time_level(self.time_level.clone())
            .params(self.params.clone())
            .engine(self.engine.clone())
    }

    pub fn to_stub(&self) -> Result<DatasetMetadata> {
        self.builder().build_stub(self.hash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredecessorRecord {
    /// Edge name under which the predecessor is referenced.
    pub param_name: String,
    pub metadata: StubRecord,
}

/// One persisted dataset description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(flatten)]
    pub stub: StubRecord,
    pub predecessors: Vec<PredecessorRecord>,
    pub declared_time_range: Option<TimeRange>,
    pub data_time_range: Option<TimeRange>,
}

impl MetadataRecord {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let metadata = dataset.metadata();
        let predecessors = metadata
            .predecessors()?
            .iter()
            .map(|(edge, pred)| PredecessorRecord {
                param_name: edge.clone(),
                metadata: StubRecord::from_metadata(pred),
            })
            .collect();
        Ok(Self {
            stub: StubRecord::from_metadata(metadata),
            predecessors,
            declared_time_range: dataset.declared_time_range(),
            data_time_range: dataset.data_time_range(),
        })
    }

    pub fn name(&self) -> &str {
        &self.stub.name
    }

    pub fn hash(&self) -> u64 {
        self.stub.hash
    }

    pub fn predecessor_hashes(&self) -> impl Iterator<Item = u64> + '_ {
        self.predecessors.iter().map(|p| p.metadata.hash)
    }

    /// Rebuild the identity with stub predecessors, checking the stored hash.
    pub fn to_metadata(&self) -> Result<DatasetMetadata> {
        let predecessors = self
            .predecessors
            .iter()
            .map(|p| Ok((p.param_name.clone(), p.metadata.to_stub()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let metadata = self.stub.builder().predecessors(predecessors).build()?;
        if metadata.hash() != self.stub.hash {
            return Err(DatadagError::InvalidDeclaration(format!(
                "stored hash {} of '{}' does not match its recomputed hash {}",
                self.stub.hash,
                self.stub.name,
                metadata.hash()
            )));
        }
        Ok(metadata)
    }
}
