// src/task/mod.rs

//! Tasks and the dependency edges between them.
//!
//! A task is a named, versioned, parameterised producer of one dataset. Its
//! output identity recursively encodes every upstream identity, so two tasks
//! with the same output are interchangeable and collapse into one graph node.

pub mod context;
pub mod function;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;

use crate::completion::CompletionChecker;
use crate::dag::TaskKey;
use crate::data::Payload;
use crate::errors::Result;
use crate::identity::DatasetMetadata;
use crate::persistence::SharedEngine;
use crate::time::TimeRange;

pub use context::{ContextDefaults, TaskContext};
pub use function::{FunctionTask, FunctionTaskBuilder, TaskFn, TaskInputs};

pub trait Task: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Identity of the dataset this task writes.
    fn output(&self) -> &DatasetMetadata;

    fn dependencies(&self) -> &BTreeMap<String, Dependency>;

    fn engine(&self) -> &SharedEngine;

    /// Compute and persist the output.
    fn run(&self) -> Result<()>;

    fn complete(&self) -> Result<bool>;

    fn is_time_series(&self) -> bool {
        !self.output().is_static()
    }

    /// Window this task is asked to cover (time series only).
    fn time_range(&self) -> Option<TimeRange> {
        None
    }

    /// Lookback used for dependency edges without their own.
    fn default_lookback(&self) -> Option<TimeDelta> {
        None
    }

    fn completion_checker(&self) -> Option<&CompletionChecker> {
        None
    }

    fn read(&self, time_range: Option<&TimeRange>) -> Result<Option<Payload>> {
        self.engine().read(self.output(), time_range)
    }

    fn key(&self) -> TaskKey {
        TaskKey::of(self.output())
    }
}

/// Shared handle to a task; one upstream may feed many dependents.
pub type TaskRef = Arc<dyn Task>;

/// Edge annotation from a dependent to an upstream task.
#[derive(Debug, Clone)]
pub struct Dependency {
    task: TaskRef,
    lookback: Option<TimeDelta>,
    inherit_frequency: Option<bool>,
}

impl Dependency {
    pub fn new(task: TaskRef) -> Self {
        Self {
            task,
            lookback: None,
            inherit_frequency: None,
        }
    }

    pub fn with_lookback(mut self, lookback: TimeDelta) -> Self {
        self.lookback = Some(lookback);
        self
    }

    pub fn with_inherit_frequency(mut self, inherit: bool) -> Self {
        self.inherit_frequency = Some(inherit);
        self
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    pub fn lookback(&self) -> Option<TimeDelta> {
        self.lookback
    }

    pub fn inherit_frequency(&self) -> Option<bool> {
        self.inherit_frequency
    }

    /// Read the upstream output for a downstream window.
    ///
    /// Static upstreams, and reads without a downstream window, get the whole
    /// dataset. Otherwise the window is extended back by the edge lookback,
    /// falling back to `default_lookback`.
    pub fn read(
        &self,
        downstream: Option<&TimeRange>,
        default_lookback: Option<TimeDelta>,
    ) -> Result<Option<Payload>> {
        let window = match downstream {
            Some(range) if self.task.is_time_series() => range,
            _ => return self.task.read(None),
        };
        let window = match self.lookback.or(default_lookback) {
            Some(lookback) => window.extend_back(lookback)?,
            None => *window,
        };
        self.task.read(Some(&window))
    }
}

impl From<TaskRef> for Dependency {
    fn from(task: TaskRef) -> Self {
        Dependency::new(task)
    }
}
