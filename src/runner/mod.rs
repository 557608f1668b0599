// src/runner/mod.rs

//! Graph runners.
//!
//! A runner drives a [`Graph`] to completion through a [`GraphStatus`]:
//! ready tasks are executed, successes unlock dependents and failures block
//! every transitive dependent. A task failure never aborts the run; the
//! returned status is the result.
//!
//! - [`single`] runs tasks one at a time on the calling thread.
//! - [`concurrent`] runs tasks on tokio's blocking pool, bounded by a worker
//!   count, with all state transitions made by the loop that joins them.

pub mod concurrent;
pub mod single;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{info, warn};

use crate::dag::{Graph, GraphStatus, TaskKey};
use crate::errors::{DatadagError, Result};
use crate::task::Task;

pub use concurrent::ConcurrentRunner;
pub use single::SingleThreadedRunner;

pub trait GraphRunner: Send + Sync + fmt::Debug {
    fn run<'g>(&self, graph: &'g Graph) -> Result<GraphStatus<'g>>;
}

/// Result of executing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Run one task, turning errors and panics into a failed outcome.
///
/// `Cancelled` is handed back to the caller instead.
pub(crate) fn execute_task(task: &dyn Task) -> Result<TaskOutcome> {
    info!(task = %task.name(), "running task");
    match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(Ok(())) => Ok(TaskOutcome::Success),
        Ok(Err(DatadagError::Cancelled(reason))) => Err(DatadagError::Cancelled(reason)),
        Ok(Err(err)) => {
            warn!(task = %task.name(), error = %err, "task failed to run successfully");
            Ok(TaskOutcome::Failed(err.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(task = %task.name(), panic = %message, "task panicked");
            Ok(TaskOutcome::Failed(format!("panicked: {message}")))
        }
    }
}

/// Apply an outcome; returns the tasks that became ready.
pub(crate) fn apply_outcome(
    status: &mut GraphStatus<'_>,
    key: TaskKey,
    outcome: TaskOutcome,
) -> Vec<TaskKey> {
    match outcome {
        TaskOutcome::Success => status.assert_ran_successfully(key),
        TaskOutcome::Failed(_) => {
            status.assert_permanent_failure(key);
            Vec::new()
        }
    }
}

pub(crate) fn log_summary(status: &GraphStatus<'_>) {
    info!(
        complete = status.complete().len(),
        failed = status.failed().len(),
        blocked = status.blocked().len(),
        waiting = status.waiting().len(),
        "graph run finished"
    );
}
