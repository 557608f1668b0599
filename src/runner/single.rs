// src/runner/single.rs

use std::collections::VecDeque;

use tracing::debug;

use crate::dag::{Graph, GraphStatus, TaskKey};
use crate::errors::Result;
use crate::runner::{GraphRunner, apply_outcome, execute_task, log_summary};

/// Reference runner: one task at a time, in readiness order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleThreadedRunner;

impl SingleThreadedRunner {
    pub fn new() -> Self {
        Self
    }
}

impl GraphRunner for SingleThreadedRunner {
    fn run<'g>(&self, graph: &'g Graph) -> Result<GraphStatus<'g>> {
        let mut status = GraphStatus::new(graph)?;
        let mut queue: VecDeque<TaskKey> = status.ready().iter().copied().collect();

        while let Some(key) = queue.pop_front() {
            let Some(task) = graph.task(key) else {
                continue;
            };
            let outcome = execute_task(task.as_ref())?;
            let newly_ready = apply_outcome(&mut status, key, outcome);
            debug!(task = %graph.name_of(key), newly_ready = newly_ready.len(), "task finished");
            queue.extend(newly_ready);
        }

        log_summary(&status);
        Ok(status)
    }
}
