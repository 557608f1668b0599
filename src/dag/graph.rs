// src/dag/graph.rs

use std::collections::{HashMap, VecDeque};
use std::fmt;

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::identity::DatasetMetadata;
use crate::task::TaskRef;

/// Graph node id: the hash of the task's output identity.
///
/// Tasks with equal outputs share a key and therefore a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(u64);

impl TaskKey {
    pub fn of(output: &DatasetMetadata) -> Self {
        TaskKey(output.hash())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Transitive closure of a set of sink tasks.
///
/// Edge direction: upstream -> dependent. Built once; never mutated.
#[derive(Debug, Clone)]
pub struct Graph {
    tasks: HashMap<TaskKey, TaskRef>,
    edges: DiGraphMap<TaskKey, ()>,
}

impl Graph {
    /// Collect `sinks` and everything they depend on.
    ///
    /// Upstreams are held through immutable shared handles, so a dependency
    /// cycle cannot be constructed and the traversal always terminates.
    pub fn build<I>(sinks: I) -> Self
    where
        I: IntoIterator<Item = TaskRef>,
    {
        let mut tasks: HashMap<TaskKey, TaskRef> = HashMap::new();
        let mut edges: DiGraphMap<TaskKey, ()> = DiGraphMap::new();
        let mut frontier: VecDeque<TaskRef> = sinks.into_iter().collect();

        while let Some(task) = frontier.pop_front() {
            let key = task.key();
            if tasks.contains_key(&key) {
                continue;
            }
            edges.add_node(key);
            for dep in task.dependencies().values() {
                let upstream = dep.task().key();
                edges.add_edge(upstream, key, ());
                if !tasks.contains_key(&upstream) {
                    frontier.push_back(dep.task().clone());
                }
            }
            tasks.insert(key, task);
        }

        debug!(
            tasks = tasks.len(),
            edges = edges.edge_count(),
            "built task graph"
        );
        Self { tasks, edges }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.tasks.contains_key(&key)
    }

    pub fn task(&self, key: TaskKey) -> Option<&TaskRef> {
        self.tasks.get(&key)
    }

    /// Task name for logs and reports.
    pub fn name_of(&self, key: TaskKey) -> &str {
        self.tasks.get(&key).map(|t| t.name()).unwrap_or("<unknown>")
    }

    pub fn keys(&self) -> impl Iterator<Item = TaskKey> + '_ {
        self.tasks.keys().copied()
    }

    /// Nodes without dependents, ordered by name.
    pub fn sinks(&self) -> Vec<TaskKey> {
        let mut sinks: Vec<TaskKey> = self
            .edges
            .nodes()
            .filter(|k| {
                self.edges
                    .neighbors_directed(*k, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect();
        sinks.sort_by(|a, b| (self.name_of(*a), a).cmp(&(self.name_of(*b), b)));
        sinks
    }

    /// Direct dependents of `key`.
    pub fn successors(&self, key: TaskKey) -> Vec<TaskKey> {
        if !self.edges.contains_node(key) {
            return Vec::new();
        }
        self.edges
            .neighbors_directed(key, Direction::Outgoing)
            .collect()
    }

    /// Direct upstreams of `key`.
    pub fn predecessors(&self, key: TaskKey) -> Vec<TaskKey> {
        if !self.edges.contains_node(key) {
            return Vec::new();
        }
        self.edges
            .neighbors_directed(key, Direction::Incoming)
            .collect()
    }
}
