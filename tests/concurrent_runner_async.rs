// tests/concurrent_runner_async.rs

use datadag::dag::{Graph, TaskState};
use datadag::errors::DatadagError;
use datadag::runner::{ConcurrentRunner, GraphRunner};
use datadag::task::Task;
use datadag_test_utils::{MockTask, init_tracing, with_timeout};

#[tokio::test]
async fn run_async_drives_graph_on_callers_runtime() {
    init_tracing();
    let leaf = MockTask::builder("leaf").build_ref();
    let broken = MockTask::builder("broken").dep("in", &leaf).failing().build_ref();
    let downstream = MockTask::builder("downstream").dep("in", &broken).build_ref();
    let sibling = MockTask::builder("sibling").dep("in", &leaf).build_ref();
    let graph = Graph::build([downstream, sibling]);

    let runner = ConcurrentRunner::new(2);
    let status = with_timeout(runner.run_async(&graph)).await.expect("run");

    assert_eq!(status.complete().len(), 2);
    assert_eq!(status.failed().len(), 1);
    assert_eq!(status.blocked().len(), 1);
    assert!(status.is_finished());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_entry_point_refuses_to_nest_runtimes() {
    init_tracing();
    let graph = Graph::build([MockTask::builder("leaf").build_ref()]);
    let err = ConcurrentRunner::new(1).run(&graph).unwrap_err();
    assert!(matches!(err, DatadagError::UnsupportedOperation(_)));
}

#[tokio::test]
async fn already_complete_graph_finishes_without_running_anything() {
    init_tracing();
    let done = MockTask::builder("done").complete().build();
    let graph = Graph::build([done.clone() as datadag::task::TaskRef]);

    let status = with_timeout(ConcurrentRunner::new(4).run_async(&graph))
        .await
        .expect("run");

    assert_eq!(status.complete().len(), 1);
    assert_eq!(done.runs(), 0);
}

#[tokio::test]
async fn crashed_worker_is_recorded_as_a_failure() {
    init_tracing();
    let leaf = MockTask::builder("leaf").build_ref();
    let crashing = MockTask::builder("crashing")
        .dep("in", &leaf)
        .crashing()
        .build_ref();
    let downstream = MockTask::builder("downstream")
        .dep("in", &crashing)
        .build_ref();
    let sibling = MockTask::builder("sibling").dep("in", &leaf).build_ref();
    let graph = Graph::build([downstream.clone(), sibling]);

    let status = with_timeout(ConcurrentRunner::new(2).run_async(&graph))
        .await
        .expect("a lost worker does not abort the run");

    assert_eq!(status.state_of(crashing.key()), Some(TaskState::Failed));
    assert_eq!(
        status.state_of(downstream.key()),
        Some(TaskState::BlockedByFailedPredecessor)
    );
    assert_eq!(status.complete().len(), 2);
    assert!(status.is_finished());
}
