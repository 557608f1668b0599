// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatadagError {
    /// Malformed identity or dataset, e.g. a time level on static data.
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Operation not defined for this dataset kind or engine.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Dataset '{name}' still has {successors} successor(s); delete recursively to remove them")]
    HasSuccessors { name: String, successors: usize },

    #[error("No matching dataset: {0}")]
    NoMatchingDataset(String),

    #[error("Dataset '{dataset}' has no parameter '{param}'")]
    UnknownParameter { dataset: String, param: String },

    #[error("Requested time range {requested} does not overlap the declared time range {declared}")]
    NonOverlappingRequest { declared: String, requested: String },

    #[error(
        "Inconsistent completion checkers: dependencies {calendar:?} are calendar driven while {irregular:?} are irregular; specify a checker explicitly or adjust inherit_frequency"
    )]
    InconsistentPolicy {
        calendar: Vec<String>,
        irregular: Vec<String>,
    },

    #[error("No completion checker to inherit for task '{0}'; specify one explicitly")]
    NoPolicySource(String),

    #[error("Task '{task}' failed: {source:#}")]
    TaskExecution {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatadagError {
    pub(crate) fn task_failed(task: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        DatadagError::TaskExecution {
            task: task.into(),
            source: source.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DatadagError>;
