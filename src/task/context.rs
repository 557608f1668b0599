// src/task/context.rs

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::data::Payload;
use crate::errors::{DatadagError, Result};
use crate::persistence::SharedEngine;
use crate::task::function::{FunctionTask, FunctionTaskBuilder, TaskInputs};
use crate::task::Dependency;
use crate::time::TimeRange;

/// Base values a [`TaskContext`] falls back on.
#[derive(Debug, Clone, Default)]
pub struct ContextDefaults {
    pub version: Option<String>,
    pub engine: Option<SharedEngine>,
    pub time_range: Option<TimeRange>,
}

/// Factory for function tasks that share defaults and a namespace.
///
/// Version, engine and time range left unset on a task are inferred from its
/// dependencies, with these defaults as the base case; the completion checker
/// is inherited from the dependencies.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    defaults: ContextDefaults,
    namespace: Option<String>,
}

impl TaskContext {
    pub fn new(defaults: ContextDefaults) -> Self {
        Self {
            defaults,
            namespace: None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Copy of this context whose namespace is `<current>.<suffix>`.
    pub fn extend_namespace(&self, suffix: &str) -> Self {
        let namespace = match &self.namespace {
            Some(ns) => format!("{ns}.{suffix}"),
            None => suffix.to_string(),
        };
        Self {
            defaults: self.defaults.clone(),
            namespace: Some(namespace),
        }
    }

    pub fn time_series_task<F>(&self, name: impl Into<String>, function: F) -> FunctionTaskBuilder
    where
        F: Fn(&TaskInputs) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        FunctionTask::time_series(name, function)
            .namespace(self.namespace.clone())
            .defaults(self.defaults.clone())
    }

    pub fn static_task<F>(&self, name: impl Into<String>, function: F) -> FunctionTaskBuilder
    where
        F: Fn(&TaskInputs) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        FunctionTask::static_task(name, function)
            .namespace(self.namespace.clone())
            .defaults(self.defaults.clone())
    }
}

/// Pick the single value of a parameter among dependency values and the
/// default. One value other than the default may override it, which lets a
/// new version propagate down a subgraph.
fn pick_not_default<T, F>(param: &str, values: Vec<T>, default: Option<T>, same: F) -> Result<T>
where
    T: Clone + fmt::Debug,
    F: Fn(&T, &T) -> bool,
{
    let mut distinct: Vec<T> = Vec::new();
    for value in values.into_iter().chain(default.clone()) {
        if !distinct.iter().any(|seen| same(seen, &value)) {
            distinct.push(value);
        }
    }
    match distinct.len() {
        0 => Err(DatadagError::InvalidDeclaration(format!(
            "no dependency or default value from which to infer '{param}'; specify it explicitly"
        ))),
        1 => Ok(distinct.remove(0)),
        2 => {
            let Some(default) = default else {
                return Err(DatadagError::InvalidDeclaration(format!(
                    "dependencies disagree on '{param}': {distinct:?}"
                )));
            };
            distinct
                .into_iter()
                .find(|v| !same(v, &default))
                .ok_or_else(|| {
                    DatadagError::InvalidDeclaration(format!("cannot infer '{param}'"))
                })
        }
        n => Err(DatadagError::InvalidDeclaration(format!(
            "exactly one non-default value is allowed for '{param}', found {n}"
        ))),
    }
}

pub(crate) fn infer_version(
    dependencies: &BTreeMap<String, Dependency>,
    defaults: &ContextDefaults,
) -> Result<String> {
    let values = dependencies
        .values()
        .map(|dep| dep.task().output().version().to_string())
        .collect();
    let version = pick_not_default("version", values, defaults.version.clone(), |a, b| a == b)?;
    debug!(version = %version, "inferred version");
    Ok(version)
}

/// Engines are compared by their state, not by handle.
pub(crate) fn infer_engine(
    dependencies: &BTreeMap<String, Dependency>,
    defaults: &ContextDefaults,
) -> Result<SharedEngine> {
    let values = dependencies
        .values()
        .map(|dep| dep.task().engine().clone())
        .collect();
    pick_not_default("engine", values, defaults.engine.clone(), |a, b| {
        a.state() == b.state()
    })
}

/// Intersection of the time series dependency windows and the default.
pub(crate) fn infer_time_range(
    dependencies: &BTreeMap<String, Dependency>,
    defaults: &ContextDefaults,
) -> Result<TimeRange> {
    let ranges: Vec<TimeRange> = dependencies
        .values()
        .filter(|dep| dep.task().is_time_series())
        .filter_map(|dep| dep.task().time_range())
        .chain(defaults.time_range)
        .collect();
    let start = ranges.iter().map(TimeRange::start).max();
    let end = ranges.iter().map(TimeRange::end).min();
    match (start, end) {
        (Some(start), Some(end)) => TimeRange::new(start, end).map_err(|_| {
            DatadagError::InvalidDeclaration(format!(
                "dependency time ranges do not overlap: {}",
                ranges
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }),
        _ => Err(DatadagError::InvalidDeclaration(
            "no dependency or default value from which to infer 'time_range'; specify it explicitly"
                .to_string(),
        )),
    }
}
