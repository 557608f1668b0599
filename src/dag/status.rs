// src/dag/status.rs

//! Per-run state machine over a [`Graph`].

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

use tracing::{debug, warn};

use crate::dag::graph::{Graph, TaskKey};
use crate::errors::Result;

/// State of a task inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Complete,
    /// Every dependency is complete.
    Ready,
    /// At least one dependency is not complete yet.
    Waiting,
    Failed,
    /// A transitive upstream failed; the task will not run.
    BlockedByFailedPredecessor,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Complete | TaskState::Failed | TaskState::BlockedByFailedPredecessor
        )
    }
}

/// Which tasks are complete, ready, waiting, failed or blocked.
///
/// Mutated only through [`GraphStatus::assert_ran_successfully`] and
/// [`GraphStatus::assert_permanent_failure`], from a single control loop.
#[derive(Debug, Clone)]
pub struct GraphStatus<'g> {
    graph: &'g Graph,
    complete: BTreeSet<TaskKey>,
    ready: BTreeSet<TaskKey>,
    waiting: BTreeSet<TaskKey>,
    failed: BTreeSet<TaskKey>,
    blocked: BTreeSet<TaskKey>,
}

impl<'g> GraphStatus<'g> {
    /// Compute the initial partition.
    ///
    /// Walks from the sinks. A complete task stops the walk; its upstreams are
    /// never inspected and keep no state. Errors from `complete()` propagate.
    pub fn new(graph: &'g Graph) -> Result<Self> {
        let mut status = Self {
            graph,
            complete: BTreeSet::new(),
            ready: BTreeSet::new(),
            waiting: BTreeSet::new(),
            failed: BTreeSet::new(),
            blocked: BTreeSet::new(),
        };

        let mut queue: VecDeque<TaskKey> = graph.sinks().into_iter().collect();
        let mut visited: HashSet<TaskKey> = HashSet::new();
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) {
                continue;
            }
            let Some(task) = graph.task(key) else {
                continue;
            };
            if task.complete()? {
                status.complete.insert(key);
            } else {
                status.waiting.insert(key);
                queue.extend(
                    graph
                        .predecessors(key)
                        .into_iter()
                        .filter(|p| !visited.contains(p)),
                );
            }
        }

        let now_ready: Vec<TaskKey> = status
            .waiting
            .iter()
            .copied()
            .filter(|k| status.dependencies_complete(*k))
            .collect();
        for key in now_ready {
            status.waiting.remove(&key);
            status.ready.insert(key);
        }

        debug!(
            tasks = graph.len(),
            complete = status.complete.len(),
            ready = status.ready.len(),
            waiting = status.waiting.len(),
            "initialised graph status"
        );
        Ok(status)
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn complete(&self) -> &BTreeSet<TaskKey> {
        &self.complete
    }

    pub fn ready(&self) -> &BTreeSet<TaskKey> {
        &self.ready
    }

    pub fn waiting(&self) -> &BTreeSet<TaskKey> {
        &self.waiting
    }

    pub fn failed(&self) -> &BTreeSet<TaskKey> {
        &self.failed
    }

    pub fn blocked(&self) -> &BTreeSet<TaskKey> {
        &self.blocked
    }

    /// `None` for tasks the run never inspected.
    pub fn state_of(&self, key: TaskKey) -> Option<TaskState> {
        if self.complete.contains(&key) {
            Some(TaskState::Complete)
        } else if self.ready.contains(&key) {
            Some(TaskState::Ready)
        } else if self.waiting.contains(&key) {
            Some(TaskState::Waiting)
        } else if self.failed.contains(&key) {
            Some(TaskState::Failed)
        } else if self.blocked.contains(&key) {
            Some(TaskState::BlockedByFailedPredecessor)
        } else {
            None
        }
    }

    /// Nothing left to run or wait for.
    pub fn is_finished(&self) -> bool {
        self.ready.is_empty() && self.waiting.is_empty()
    }

    fn dependencies_complete(&self, key: TaskKey) -> bool {
        self.graph
            .predecessors(key)
            .iter()
            .all(|p| self.complete.contains(p))
    }

    /// Mark `key` complete; returns the dependents that became ready.
    pub fn assert_ran_successfully(&mut self, key: TaskKey) -> Vec<TaskKey> {
        let was_pending = self.ready.remove(&key) | self.waiting.remove(&key);
        if !was_pending {
            warn!(
                task = %self.graph.name_of(key),
                state = ?self.state_of(key),
                "success reported for a task that was not pending; ignoring"
            );
            return Vec::new();
        }
        self.complete.insert(key);

        let mut newly_ready = Vec::new();
        for successor in self.graph.successors(key) {
            if self.waiting.contains(&successor) && self.dependencies_complete(successor) {
                self.waiting.remove(&successor);
                self.ready.insert(successor);
                newly_ready.push(successor);
            }
        }
        newly_ready.sort();
        debug!(
            task = %self.graph.name_of(key),
            newly_ready = newly_ready.len(),
            "task complete"
        );
        newly_ready
    }

    /// Mark `key` failed and block every transitive dependent; returns the
    /// newly blocked tasks. Complete tasks are never demoted.
    pub fn assert_permanent_failure(&mut self, key: TaskKey) -> Vec<TaskKey> {
        let was_pending = self.ready.remove(&key) | self.waiting.remove(&key);
        if !was_pending {
            warn!(
                task = %self.graph.name_of(key),
                state = ?self.state_of(key),
                "failure reported for a task that was not pending; ignoring"
            );
            return Vec::new();
        }
        self.failed.insert(key);

        let mut newly_blocked = Vec::new();
        let mut queue: VecDeque<TaskKey> = self.graph.successors(key).into();
        while let Some(successor) = queue.pop_front() {
            if self.complete.contains(&successor)
                || self.failed.contains(&successor)
                || self.blocked.contains(&successor)
            {
                continue;
            }
            self.ready.remove(&successor);
            self.waiting.remove(&successor);
            self.blocked.insert(successor);
            newly_blocked.push(successor);
            queue.extend(self.graph.successors(successor));
        }
        newly_blocked.sort();
        if !newly_blocked.is_empty() {
            warn!(
                task = %self.graph.name_of(key),
                blocked = newly_blocked.len(),
                "dependents blocked by failed task"
            );
        }
        newly_blocked
    }
}

impl fmt::Display for GraphStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph Status:")?;
        writeln!(f, "    Graph contains {} tasks", self.graph.len())?;
        writeln!(f, "    {} are complete", self.complete.len())?;
        writeln!(f, "    {} have failed", self.failed.len())?;
        writeln!(f, "    {} are ready to run", self.ready.len())?;
        writeln!(
            f,
            "    {} are waiting for predecessors to complete",
            self.waiting.len()
        )?;
        writeln!(
            f,
            "    {} cannot be run because a predecessor failed",
            self.blocked.len()
        )?;
        let mut failed: Vec<&str> = self
            .failed
            .iter()
            .map(|k| self.graph.name_of(*k))
            .collect();
        failed.sort_unstable();
        if failed.is_empty() {
            write!(f, "    No tasks failed")
        } else {
            writeln!(f, "    The tasks which directly failed are:")?;
            for (i, name) in failed.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                write!(f, "        {name}")?;
            }
            Ok(())
        }
    }
}
