#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use datadag::errors::{DatadagError, Result};
use datadag::identity::{DatasetMetadata, MetadataBuilder};
use datadag::persistence::SharedEngine;
use datadag::persistence::memory::MemoryEngine;
use datadag::task::{Dependency, Task, TaskRef};

/// How a [`MockTask`] behaves when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Crash,
    Cancel,
}

/// Panic payload that panics again when dropped, so the panic escapes any
/// `catch_unwind` that inspects and then discards it.
struct ExplodingPayload;

impl Drop for ExplodingPayload {
    fn drop(&mut self) {
        panic!("panic payload exploded while being dropped");
    }
}

/// Task whose completeness is a flag. Identity depends on the name only, so
/// two mocks with the same name are the same graph node.
#[derive(Debug)]
pub struct MockTask {
    output: DatasetMetadata,
    dependencies: BTreeMap<String, Dependency>,
    engine: SharedEngine,
    complete: AtomicBool,
    behaviour: Behaviour,
    runs: AtomicUsize,
}

impl MockTask {
    pub fn builder(name: &str) -> MockTaskBuilder {
        MockTaskBuilder::new(name)
    }

    /// How many times `run` has been called.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Task for MockTask {
    fn name(&self) -> &str {
        self.output.name()
    }

    fn output(&self) -> &DatasetMetadata {
        &self.output
    }

    fn dependencies(&self) -> &BTreeMap<String, Dependency> {
        &self.dependencies
    }

    fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => {
                self.complete.store(true, Ordering::SeqCst);
                Ok(())
            }
            Behaviour::Fail => Err(DatadagError::TaskExecution {
                task: self.name().to_string(),
                source: anyhow!("task raised an error"),
            }),
            Behaviour::Panic => panic!("mock task '{}' panicked", self.name()),
            Behaviour::Crash => std::panic::panic_any(ExplodingPayload),
            Behaviour::Cancel => Err(DatadagError::Cancelled(format!(
                "mock task '{}' cancelled the run",
                self.name()
            ))),
        }
    }

    fn complete(&self) -> Result<bool> {
        Ok(self.complete.load(Ordering::SeqCst))
    }
}

pub struct MockTaskBuilder {
    name: String,
    complete: bool,
    behaviour: Behaviour,
    dependencies: BTreeMap<String, Dependency>,
}

impl MockTaskBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            complete: false,
            behaviour: Behaviour::Succeed,
            dependencies: BTreeMap::new(),
        }
    }

    pub fn complete(mut self) -> Self {
        self.complete = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.behaviour = Behaviour::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    /// Take down the worker thread running the task, not just the task.
    pub fn crashing(mut self) -> Self {
        self.behaviour = Behaviour::Crash;
        self
    }

    pub fn cancelling(mut self) -> Self {
        self.behaviour = Behaviour::Cancel;
        self
    }

    pub fn dep(mut self, edge: &str, task: &TaskRef) -> Self {
        self.dependencies
            .insert(edge.to_string(), Dependency::new(task.clone()));
        self
    }

    pub fn build(self) -> Arc<MockTask> {
        let output = MetadataBuilder::new(self.name)
            .is_static(true)
            .build()
            .expect("valid mock metadata");
        Arc::new(MockTask {
            output,
            dependencies: self.dependencies,
            engine: Arc::new(MemoryEngine::new()),
            complete: AtomicBool::new(self.complete),
            behaviour: self.behaviour,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn build_ref(self) -> TaskRef {
        self.build()
    }
}
