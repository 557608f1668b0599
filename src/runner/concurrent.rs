// src/runner/concurrent.rs

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::thread;

use tokio::runtime::{Builder, Handle};
use tokio::task::{Id as WorkerId, JoinSet};
use tracing::{debug, info, warn};

use crate::dag::{Graph, GraphStatus, TaskKey};
use crate::errors::{DatadagError, Result};
use crate::runner::{GraphRunner, TaskOutcome, apply_outcome, execute_task, log_summary};

/// Runs ready tasks in parallel on tokio's blocking pool.
///
/// At most `max_workers` tasks are in flight. Workers only execute
/// `Task::run`; the scheduling loop joins them and makes every status
/// transition, so the status needs no locking. A worker that dies or is
/// cancelled without reporting counts as a failed task. A task is never
/// started before all of its dependencies are complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrentRunner {
    max_workers: usize,
}

impl Default for ConcurrentRunner {
    fn default() -> Self {
        Self::with_available_parallelism()
    }
}

impl ConcurrentRunner {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn with_available_parallelism() -> Self {
        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(workers)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Drive `graph` on the caller's tokio runtime.
    pub async fn run_async<'g>(&self, graph: &'g Graph) -> Result<GraphStatus<'g>> {
        let mut status = GraphStatus::new(graph)?;
        let mut pending: VecDeque<TaskKey> = status.ready().iter().copied().collect();
        let mut workers: JoinSet<TaskOutcome> = JoinSet::new();
        let mut active: HashMap<WorkerId, TaskKey> = HashMap::new();

        info!(
            max_workers = self.max_workers,
            ready = pending.len(),
            "concurrent runner started"
        );

        loop {
            while workers.len() < self.max_workers {
                let Some(key) = pending.pop_front() else {
                    break;
                };
                let Some(task) = graph.task(key).cloned() else {
                    continue;
                };
                let handle = workers.spawn_blocking(move || {
                    // no mid-task cancellation here; a cancelled task is a failed one
                    execute_task(&*task)
                        .unwrap_or_else(|err| TaskOutcome::Failed(err.to_string()))
                });
                active.insert(handle.id(), key);
            }

            let Some(joined) = workers.join_next_with_id().await else {
                break;
            };
            let (id, result) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(err) => (err.id(), Err(err)),
            };
            let Some(key) = active.remove(&id) else {
                warn!(worker = %id, "finished worker has no task attached");
                continue;
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    // the worker died or was cancelled before reporting back
                    warn!(
                        task = %graph.name_of(key),
                        error = %err,
                        "worker did not report an outcome"
                    );
                    TaskOutcome::Failed(format!("worker lost: {err}"))
                }
            };
            debug!(task = %graph.name_of(key), ?outcome, "worker finished");
            pending.extend(apply_outcome(&mut status, key, outcome));
        }

        log_summary(&status);
        Ok(status)
    }
}

impl GraphRunner for ConcurrentRunner {
    /// Blocking entry point; builds a private runtime. Inside an existing
    /// runtime use [`ConcurrentRunner::run_async`] instead.
    fn run<'g>(&self, graph: &'g Graph) -> Result<GraphStatus<'g>> {
        if Handle::try_current().is_ok() {
            return Err(DatadagError::UnsupportedOperation(
                "ConcurrentRunner::run cannot block inside a tokio runtime; use run_async"
                    .to_string(),
            ));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.max_workers)
            .thread_name("datadag-worker")
            .enable_all()
            .build()?;
        runtime.block_on(self.run_async(graph))
    }
}
