// src/data/mod.rs

//! Stored payloads and the [`Dataset`] value that pairs them with an identity.

pub mod frame;

use serde::{Deserialize, Serialize};

use crate::errors::{DatadagError, Result};
use crate::identity::DatasetMetadata;
use crate::time::TimeRange;

pub use frame::{Frame, Row};

/// Opaque dataset payload: a time-indexed frame or, for static data, any
/// JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Frame(Frame),
    Value(serde_json::Value),
}

impl Payload {
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Payload::Frame(frame) => Some(frame),
            Payload::Value(_) => None,
        }
    }

    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Payload::Frame(frame) => Some(frame),
            Payload::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Value(value) => Some(value),
            Payload::Frame(_) => None,
        }
    }
}

impl From<Frame> for Payload {
    fn from(frame: Frame) -> Self {
        Payload::Frame(frame)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Value(value)
    }
}

/// Immutable pairing of identity, payload and declared coverage.
///
/// The declared time range is `None` exactly for static datasets; otherwise
/// it must contain the range spanned by the frame's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    metadata: DatasetMetadata,
    data: Payload,
    declared_time_range: Option<TimeRange>,
}

impl Dataset {
    pub fn new(
        metadata: DatasetMetadata,
        data: Payload,
        declared_time_range: Option<TimeRange>,
    ) -> Result<Self> {
        if metadata.is_static() {
            if let Some(range) = declared_time_range {
                return Err(DatadagError::InvalidDeclaration(format!(
                    "static dataset '{}' cannot declare a time range (got {range})",
                    metadata.name()
                )));
            }
        } else {
            let frame = data.as_frame().ok_or_else(|| {
                DatadagError::InvalidDeclaration(format!(
                    "time series dataset '{}' must carry a frame",
                    metadata.name()
                ))
            })?;
            let declared = declared_time_range.ok_or_else(|| {
                DatadagError::InvalidDeclaration(format!(
                    "time series dataset '{}' must declare a time range",
                    metadata.name()
                ))
            })?;
            if let Some(actual) = frame.time_range() {
                if !declared.contains(&actual) {
                    return Err(DatadagError::InvalidDeclaration(format!(
                        "declared time range {declared} of '{}' does not contain its data time range {actual}",
                        metadata.name()
                    )));
                }
            }
        }
        Ok(Self {
            metadata,
            data,
            declared_time_range,
        })
    }

    /// Time series dataset; the declared range defaults to the data's own span.
    pub fn time_series(
        metadata: DatasetMetadata,
        frame: Frame,
        declared_time_range: Option<TimeRange>,
    ) -> Result<Self> {
        let declared = match declared_time_range {
            Some(range) => range,
            None => frame.time_range().ok_or_else(|| {
                DatadagError::InvalidDeclaration(format!(
                    "cannot infer a declared time range for empty dataset '{}'",
                    metadata.name()
                ))
            })?,
        };
        Self::new(metadata, Payload::Frame(frame), Some(declared))
    }

    pub fn static_value(metadata: DatasetMetadata, data: impl Into<Payload>) -> Result<Self> {
        Self::new(metadata, data.into(), None)
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.data.as_frame()
    }

    pub fn declared_time_range(&self) -> Option<TimeRange> {
        self.declared_time_range
    }

    /// Range spanned by the rows held in this value (not the whole store).
    pub fn data_time_range(&self) -> Option<TimeRange> {
        self.data.as_frame().and_then(Frame::time_range)
    }

    /// Same identity, new payload.
    pub fn update(&self, data: Payload, declared_time_range: Option<TimeRange>) -> Result<Self> {
        Self::new(self.metadata.clone(), data, declared_time_range)
    }

    pub fn into_data(self) -> Payload {
        self.data
    }
}
