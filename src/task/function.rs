// src/task/function.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::TimeDelta;
use tracing::{debug, info};

use crate::completion::{CompletionChecker, infer_inherited_checker};
use crate::data::{Dataset, Frame, Payload};
use crate::errors::{DatadagError, Result};
use crate::identity::{DatasetMetadata, ParamValue, Params, TimeLevel};
use crate::persistence::SharedEngine;
use crate::task::context::{ContextDefaults, infer_engine, infer_time_range, infer_version};
use crate::task::{Dependency, Task, TaskRef};
use crate::time::TimeRange;

/// User computation behind a [`FunctionTask`].
pub type TaskFn = Arc<dyn Fn(&TaskInputs) -> anyhow::Result<Payload> + Send + Sync>;

/// Arguments handed to a task function.
#[derive(Debug, Clone)]
pub struct TaskInputs {
    params: Params,
    data: BTreeMap<String, Payload>,
    time_range: Option<TimeRange>,
}

impl TaskInputs {
    pub fn new(
        params: Params,
        data: BTreeMap<String, Payload>,
        time_range: Option<TimeRange>,
    ) -> Self {
        Self {
            params,
            data,
            time_range,
        }
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn input(&self, edge: &str) -> anyhow::Result<&Payload> {
        self.data
            .get(edge)
            .ok_or_else(|| anyhow!("no input named '{edge}'"))
    }

    pub fn frame(&self, edge: &str) -> anyhow::Result<&Frame> {
        self.input(edge)?
            .as_frame()
            .ok_or_else(|| anyhow!("input '{edge}' is not a frame"))
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Static,
    TimeSeries {
        time_range: TimeRange,
        default_lookback: Option<TimeDelta>,
        checker: CompletionChecker,
    },
}

/// Task that wraps a plain function.
///
/// Static tasks `replace` their output; time series tasks restrict the result
/// to their window, `append` it and then verify they are complete.
pub struct FunctionTask {
    kind: Kind,
    function: TaskFn,
    params: Params,
    dependencies: BTreeMap<String, Dependency>,
    engine: SharedEngine,
    output: DatasetMetadata,
}

impl fmt::Debug for FunctionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTask")
            .field("output", &self.output)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionTask {
    pub fn static_task<F>(name: impl Into<String>, function: F) -> FunctionTaskBuilder
    where
        F: Fn(&TaskInputs) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        FunctionTaskBuilder::new(name.into(), false, Arc::new(function))
    }

    pub fn time_series<F>(name: impl Into<String>, function: F) -> FunctionTaskBuilder
    where
        F: Fn(&TaskInputs) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        FunctionTaskBuilder::new(name.into(), true, Arc::new(function))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn gather_inputs(&self) -> Result<TaskInputs> {
        let (window, default_lookback) = match &self.kind {
            Kind::Static => (None, None),
            Kind::TimeSeries {
                time_range,
                default_lookback,
                ..
            } => (Some(*time_range), *default_lookback),
        };
        let mut data = BTreeMap::new();
        for (edge, dep) in &self.dependencies {
            let value = dep.read(window.as_ref(), default_lookback)?.ok_or_else(|| {
                DatadagError::task_failed(
                    self.name(),
                    anyhow!("failed to read dependency '{edge}': no data stored"),
                )
            })?;
            data.insert(edge.clone(), value);
        }
        Ok(TaskInputs::new(self.params.clone(), data, window))
    }
}

impl Task for FunctionTask {
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

    fn time_range(&self) -> Option<TimeRange> {
        match &self.kind {
            Kind::Static => None,
            Kind::TimeSeries { time_range, .. } => Some(*time_range),
        }
    }

    fn default_lookback(&self) -> Option<TimeDelta> {
        match &self.kind {
            Kind::Static => None,
            Kind::TimeSeries {
                default_lookback, ..
            } => *default_lookback,
        }
    }

    fn completion_checker(&self) -> Option<&CompletionChecker> {
        match &self.kind {
            Kind::Static => None,
            Kind::TimeSeries { checker, .. } => Some(checker),
        }
    }

    fn run(&self) -> Result<()> {
        let inputs = self.gather_inputs()?;
        debug!(task = %self.name(), inputs = inputs.data.len(), "calling task function");
        let result = (self.function)(&inputs)
            .map_err(|err| DatadagError::task_failed(self.name(), err))?;

        match &self.kind {
            Kind::Static => {
                let dataset = Dataset::static_value(self.output.clone(), result)?;
                self.engine.replace(&dataset)?;
            }
            Kind::TimeSeries { time_range, .. } => {
                let frame = result.into_frame().ok_or_else(|| {
                    DatadagError::task_failed(
                        self.name(),
                        anyhow!("a time series task must return a frame"),
                    )
                })?;
                // never write outside the requested window
                let frame = frame.view(time_range);
                let dataset = Dataset::time_series(self.output.clone(), frame, Some(*time_range))?;
                self.engine.append(&dataset)?;

                if !self.complete()? {
                    return Err(DatadagError::task_failed(
                        self.name(),
                        anyhow!(
                            "the task wrote its output but its completion checker still reports it incomplete"
                        ),
                    ));
                }
            }
        }
        info!(task = %self.name(), hash = self.output.hash(), "task completed successfully");
        Ok(())
    }

    fn complete(&self) -> Result<bool> {
        match &self.kind {
            Kind::Static => self.engine.exists(&self.output),
            Kind::TimeSeries {
                time_range,
                checker,
                ..
            } => checker.is_complete(&*self.engine, &self.output, Some(time_range)),
        }
    }
}

/// Builder for [`FunctionTask`]. Missing version, engine and time range are
/// inferred from the dependencies and the context defaults; a missing
/// completion checker is inherited from the dependencies.
pub struct FunctionTaskBuilder {
    name: String,
    time_series: bool,
    function: TaskFn,
    namespace: Option<String>,
    version: Option<String>,
    engine: Option<SharedEngine>,
    time_range: Option<TimeRange>,
    time_level: Option<TimeLevel>,
    default_lookback: Option<TimeDelta>,
    checker: Option<CompletionChecker>,
    params: Params,
    dependencies: BTreeMap<String, Dependency>,
    defaults: ContextDefaults,
}

impl FunctionTaskBuilder {
    fn new(name: String, time_series: bool, function: TaskFn) -> Self {
        Self {
            name,
            time_series,
            function,
            namespace: None,
            version: None,
            engine: None,
            time_range: None,
            time_level: None,
            default_lookback: None,
            checker: None,
            params: Params::new(),
            dependencies: BTreeMap::new(),
            defaults: ContextDefaults::default(),
        }
    }

    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn engine(mut self, engine: SharedEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn time_level(mut self, level: TimeLevel) -> Self {
        self.time_level = Some(level);
        self
    }

    pub fn default_lookback(mut self, lookback: TimeDelta) -> Self {
        self.default_lookback = Some(lookback);
        self
    }

    pub fn completion_checker(mut self, checker: CompletionChecker) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn dependency(mut self, edge: impl Into<String>, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.insert(edge.into(), dependency.into());
        self
    }

    pub fn depends_on(self, edge: impl Into<String>, task: &TaskRef) -> Self {
        self.dependency(edge, Dependency::new(task.clone()))
    }

    pub(crate) fn defaults(mut self, defaults: ContextDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> Result<FunctionTask> {
        let qualified = match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        };

        let version = match self.version {
            Some(v) => v,
            None => infer_version(&self.dependencies, &self.defaults)?,
        };
        let engine = match self.engine {
            Some(e) => e,
            None => infer_engine(&self.dependencies, &self.defaults)?,
        };

        let kind = if self.time_series {
            let time_range = match self.time_range {
                Some(r) => r,
                None => infer_time_range(&self.dependencies, &self.defaults)?,
            };
            let checker = match self.checker {
                Some(c) => c,
                None => infer_inherited_checker(&qualified, &self.dependencies)?,
            };
            Kind::TimeSeries {
                time_range,
                default_lookback: self.default_lookback,
                checker,
            }
        } else {
            if self.time_level.is_some() || self.time_range.is_some() {
                return Err(DatadagError::InvalidDeclaration(format!(
                    "static task '{qualified}' cannot declare a time range or time level"
                )));
            }
            Kind::Static
        };

        let predecessors = self
            .dependencies
            .iter()
            .map(|(edge, dep)| (edge.clone(), dep.task().output().clone()))
            .collect();
        let output = DatasetMetadata::builder(qualified)
            .is_static(!self.time_series)
            .version(version)
            .time_level(self.time_level)
            .params(self.params.clone())
            .engine(engine.state())
            .predecessors(predecessors)
            .build()?;

        debug!(task = %output.name(), hash = output.hash(), "built function task");
        Ok(FunctionTask {
            kind,
            function: self.function,
            params: self.params,
            dependencies: self.dependencies,
            engine,
            output,
        })
    }

    /// Build straight into a shared handle.
    pub fn build_ref(self) -> Result<TaskRef> {
        Ok(Arc::new(self.build()?))
    }
}
