// tests/tasks.rs

use std::sync::Arc;

use anyhow::{anyhow, ensure};
use chrono::TimeDelta;
use datadag::completion::CompletionChecker;
use datadag::dag::Graph;
use datadag::data::{Frame, Payload};
use datadag::errors::DatadagError;
use datadag::persistence::memory::MemoryEngine;
use datadag::persistence::{PersistenceEngine, SharedEngine};
use datadag::runner::{GraphRunner, SingleThreadedRunner};
use datadag::task::{ContextDefaults, Dependency, Task, TaskContext, TaskInputs};
use datadag::time::IntervalCalendar;
use datadag_test_utils::{day, daily_range, init_tracing};
use serde_json::json;

fn memory() -> SharedEngine {
    Arc::new(MemoryEngine::new())
}

fn context(engine: &SharedEngine) -> TaskContext {
    TaskContext::new(ContextDefaults {
        version: Some("v1".to_string()),
        engine: Some(engine.clone()),
        time_range: Some(daily_range(1, 11)),
    })
}

/// One row per day across the requested window.
fn daily_source(inputs: &TaskInputs) -> anyhow::Result<Payload> {
    let range = inputs
        .time_range()
        .ok_or_else(|| anyhow!("time series task without a window"))?;
    let mut frame = Frame::new();
    let mut ts = range.start();
    while ts < range.end() {
        frame.insert(ts, "value", 1.0);
        ts += TimeDelta::days(1);
    }
    Ok(frame.into())
}

fn doubled(inputs: &TaskInputs) -> anyhow::Result<Payload> {
    let source = inputs.frame("raw")?;
    let out = Frame::from_series(
        "value",
        source
            .rows()
            .filter_map(|(ts, row)| row.get("value").map(|v| (*ts, v * 2.0))),
    );
    Ok(out.into())
}

#[test]
fn pipeline_runs_end_to_end_and_is_then_complete() {
    init_tracing();
    let engine = memory();
    let ctx = context(&engine);

    let raw = ctx
        .time_series_task("raw", daily_source)
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("raw");
    let twice = ctx
        .time_series_task("doubled", doubled)
        .depends_on("raw", &raw)
        .build_ref()
        .expect("doubled");
    let summary = ctx
        .static_task("summary", |inputs: &TaskInputs| {
            let rows = inputs.frame("doubled")?.len();
            Ok(json!({ "rows": rows }).into())
        })
        .depends_on("doubled", &twice)
        .build_ref()
        .expect("summary");

    assert_eq!(twice.output().version(), "v1");
    assert_eq!(twice.time_range(), Some(daily_range(1, 11)));
    assert!(matches!(
        twice.completion_checker(),
        Some(CompletionChecker::Irregular)
    ));

    let graph = Graph::build([summary.clone()]);
    let status = SingleThreadedRunner::new().run(&graph).expect("run");
    assert_eq!(status.complete().len(), 3, "{status}");
    assert!(status.failed().is_empty());

    let stored = engine
        .read(twice.output(), None)
        .expect("read")
        .and_then(Payload::into_frame)
        .expect("frame");
    assert_eq!(stored.len(), 10);
    assert_eq!(stored.get(&day(4), "value"), Some(2.0));
    assert_eq!(
        summary.read(None).expect("read"),
        Some(Payload::Value(json!({ "rows": 10 })))
    );

    let again = Graph::build([summary]);
    let status = SingleThreadedRunner::new().run(&again).expect("second run");
    assert_eq!(status.complete().len(), 1);
    assert!(status.is_finished());
}

#[test]
fn identical_declarations_share_an_identity() {
    let engine = memory();
    let ctx = context(&engine);
    let build = || {
        ctx.time_series_task("raw", daily_source)
            .param("window", 3)
            .completion_checker(CompletionChecker::Irregular)
            .build_ref()
            .expect("raw")
    };
    let (a, b) = (build(), build());
    assert_eq!(a.key(), b.key());
    assert_eq!(Graph::build([a, b]).len(), 1);
}

#[test]
fn namespaces_qualify_output_names() {
    let engine = memory();
    let ctx = context(&engine).extend_namespace("prices").extend_namespace("eu");
    assert_eq!(ctx.namespace(), Some("prices.eu"));

    let task = ctx
        .static_task("raw", |_: &TaskInputs| Ok(json!(1).into()))
        .build()
        .expect("task");
    assert_eq!(task.name(), "prices.eu.raw");
    assert_eq!(task.output().name(), "prices.eu.raw");
}

#[test]
fn dependency_lookback_extends_the_upstream_read() {
    init_tracing();
    let engine = memory();
    let ctx = context(&engine);
    let raw = ctx
        .time_series_task("raw", daily_source)
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("raw");
    raw.run().expect("raw run");

    let smoothed = ctx
        .time_series_task("smoothed", |inputs: &TaskInputs| {
            let source = inputs.frame("raw")?;
            ensure!(
                source.first_index() == Some(day(3)),
                "expected two days of lookback, first row is {:?}",
                source.first_index()
            );
            Ok(source.clone().into())
        })
        .time_range(daily_range(5, 11))
        .dependency(
            "raw",
            Dependency::new(raw.clone()).with_lookback(TimeDelta::days(2)),
        )
        .build()
        .expect("smoothed");
    smoothed.run().expect("smoothed run");

    let stored = smoothed
        .read(None)
        .expect("read")
        .and_then(Payload::into_frame)
        .expect("frame");
    // output is restricted to the task's own window
    assert_eq!(stored.first_index(), Some(day(5)));
    assert_eq!(stored.len(), 6);
}

#[test]
fn default_lookback_applies_to_edges_without_their_own() {
    let engine = memory();
    let ctx = context(&engine);
    let raw = ctx
        .time_series_task("raw", daily_source)
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("raw");
    raw.run().expect("raw run");

    let dep = Dependency::new(raw.clone());
    let frame = dep
        .read(Some(&daily_range(5, 11)), Some(TimeDelta::days(1)))
        .expect("read")
        .and_then(Payload::into_frame)
        .expect("frame");
    assert_eq!(frame.first_index(), Some(day(4)));

    let whole = dep.read(None, Some(TimeDelta::days(1))).expect("read");
    assert_eq!(whole.and_then(Payload::into_frame).map(|f| f.len()), Some(10));
}

#[test]
fn missing_upstream_data_fails_the_task() {
    let engine = memory();
    let ctx = context(&engine);
    let raw = ctx
        .time_series_task("raw", daily_source)
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("raw");
    let twice = ctx
        .time_series_task("doubled", doubled)
        .depends_on("raw", &raw)
        .build()
        .expect("doubled");

    let err = twice.run().unwrap_err();
    assert!(matches!(err, DatadagError::TaskExecution { ref task, .. } if task == "doubled"));
}

#[test]
fn task_that_stays_incomplete_after_writing_fails() {
    init_tracing();
    let engine = memory();
    let ctx = context(&engine);
    let short = ctx
        .time_series_task("short", |_: &TaskInputs| {
            Ok(Frame::from_series("value", (1..=5).map(|d| (day(d), 1.0))).into())
        })
        .completion_checker(CompletionChecker::calendar(IntervalCalendar::daily(day(1))))
        .build_ref()
        .expect("short");

    let err = short.run().unwrap_err();
    assert!(matches!(err, DatadagError::TaskExecution { .. }));
    assert!(engine.exists(short.output()).expect("exists"));

    let graph = Graph::build([short]);
    let status = SingleThreadedRunner::new().run(&graph).expect("run");
    assert_eq!(status.failed().len(), 1);
}

#[test]
fn function_errors_are_wrapped_as_task_failures() {
    let engine = memory();
    let task = context(&engine)
        .static_task("broken", |_: &TaskInputs| Err(anyhow!("bad input")))
        .build()
        .expect("task");
    match task.run() {
        Err(DatadagError::TaskExecution { task, source }) => {
            assert_eq!(task, "broken");
            assert!(source.to_string().contains("bad input"));
        }
        other => panic!("expected TaskExecution, got {other:?}"),
    }
    assert!(!task.complete().expect("complete"));
}

#[test]
fn checker_inference_rejects_mixed_policies() {
    let engine = memory();
    let ctx = context(&engine);
    let calendar = ctx
        .time_series_task("cal", daily_source)
        .completion_checker(CompletionChecker::calendar(IntervalCalendar::daily(day(1))))
        .build_ref()
        .expect("cal");
    let irregular = ctx
        .time_series_task("irr", daily_source)
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("irr");

    let err = ctx
        .time_series_task("mixed", daily_source)
        .depends_on("a", &calendar)
        .depends_on("b", &irregular)
        .build()
        .unwrap_err();
    match err {
        DatadagError::InconsistentPolicy {
            calendar,
            irregular,
        } => {
            assert_eq!(calendar, vec!["a".to_string()]);
            assert_eq!(irregular, vec!["b".to_string()]);
        }
        other => panic!("expected InconsistentPolicy, got {other:?}"),
    }

    // opting one edge out resolves the conflict
    let resolved = ctx
        .time_series_task("mixed", daily_source)
        .depends_on("a", &calendar)
        .dependency(
            "b",
            Dependency::new(irregular.clone()).with_inherit_frequency(false),
        )
        .build()
        .expect("resolved");
    assert!(matches!(
        resolved.completion_checker(),
        Some(CompletionChecker::Calendar(_))
    ));
}

#[test]
fn time_series_task_without_any_checker_source_fails() {
    let engine = memory();
    let err = context(&engine)
        .time_series_task("orphan", daily_source)
        .build()
        .unwrap_err();
    assert!(matches!(err, DatadagError::NoPolicySource(_)));
}

#[test]
fn static_task_cannot_declare_a_window() {
    let engine = memory();
    let err = context(&engine)
        .static_task("blob", |_: &TaskInputs| Ok(json!(null).into()))
        .time_range(daily_range(1, 3))
        .build()
        .unwrap_err();
    assert!(matches!(err, DatadagError::InvalidDeclaration(_)));
}

#[test]
fn one_overriding_version_propagates_downstream() {
    let engine = memory();
    let ctx = context(&engine);
    let v2 = ctx
        .static_task("v2_source", |_: &TaskInputs| Ok(json!(2).into()))
        .version("v2")
        .build_ref()
        .expect("source");
    let plain = ctx
        .static_task("plain_source", |_: &TaskInputs| Ok(json!(1).into()))
        .build_ref()
        .expect("source");
    let v3 = ctx
        .static_task("v3_source", |_: &TaskInputs| Ok(json!(3).into()))
        .version("v3")
        .build_ref()
        .expect("source");

    let downstream = ctx
        .static_task("down", |_: &TaskInputs| Ok(json!(0).into()))
        .depends_on("a", &v2)
        .depends_on("b", &plain)
        .build()
        .expect("down");
    assert_eq!(downstream.output().version(), "v2");

    let err = ctx
        .static_task("conflict", |_: &TaskInputs| Ok(json!(0).into()))
        .depends_on("a", &v2)
        .depends_on("b", &v3)
        .build()
        .unwrap_err();
    assert!(matches!(err, DatadagError::InvalidDeclaration(_)));
}

#[test]
fn time_range_is_the_intersection_of_dependencies_and_default() {
    let engine = memory();
    let ctx = context(&engine);
    let narrow = ctx
        .time_series_task("narrow", daily_source)
        .time_range(daily_range(4, 20))
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("narrow");
    let child = ctx
        .time_series_task("child", daily_source)
        .depends_on("n", &narrow)
        .build()
        .expect("child");
    assert_eq!(child.time_range(), Some(daily_range(4, 11)));
}

#[test]
fn negative_lookback_is_rejected_on_read() {
    let engine = memory();
    let ctx = context(&engine);
    let raw = ctx
        .time_series_task("raw", daily_source)
        .completion_checker(CompletionChecker::Irregular)
        .build_ref()
        .expect("raw");
    raw.run().expect("raw run");

    let dep = Dependency::new(raw).with_lookback(TimeDelta::days(-1));
    let err = dep.read(Some(&daily_range(5, 11)), None).unwrap_err();
    assert!(matches!(err, DatadagError::InvalidDeclaration(_)));
}
