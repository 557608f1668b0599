// src/config/model.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use serde::Deserialize;

use crate::persistence::SharedEngine;
use crate::persistence::filesystem::FileSystemEngine;
use crate::persistence::memory::MemoryEngine;
use crate::runner::{ConcurrentRunner, GraphRunner, SingleThreadedRunner};

/// Configuration exactly as read from `Datadag.toml`.
///
/// ```toml
/// [store]
/// kind = "filesystem"
/// root = "./datadag-store"
///
/// [runner]
/// kind = "concurrent"
/// max_workers = 4
/// ```
///
/// Every section is optional. Convert into [`ConfigFile`] with `TryFrom`,
/// which is where validation happens.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub runner: RunnerSection,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub store: StoreSection,
    pub runner: RunnerSection,
}

impl ConfigFile {
    /// Only called from validation.
    pub(crate) fn new_unchecked(store: StoreSection, runner: RunnerSection) -> Self {
        Self { store, runner }
    }

    pub fn build_engine(&self) -> SharedEngine {
        match self.store.kind {
            StoreKind::Memory => Arc::new(MemoryEngine::new()),
            StoreKind::Filesystem => {
                let root = self.store.root.clone().unwrap_or_default();
                Arc::new(FileSystemEngine::new(root))
            }
        }
    }

    pub fn build_runner(&self) -> Box<dyn GraphRunner> {
        match self.runner.kind {
            RunnerKind::Single => Box::new(SingleThreadedRunner::new()),
            RunnerKind::Concurrent => Box::new(ConcurrentRunner::new(self.runner.max_workers)),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(StoreSection::default(), RunnerSection::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    Filesystem,
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub kind: StoreKind,

    /// Required for the filesystem store.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Single,
    #[default]
    Concurrent,
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    #[serde(default)]
    pub kind: RunnerKind,

    /// Upper bound on tasks in flight for the concurrent runner.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            kind: RunnerKind::default(),
            max_workers: default_max_workers(),
        }
    }
}
