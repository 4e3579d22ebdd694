mod common;

use std::time::Duration;

use common::{event_log, finished_index, started_index, FakeStep, StepEvent};
use tokio_util::sync::CancellationToken;

use pipewright::errors::OperatorError;
use pipewright::execute::scheduler::{run_steps, StepOutcome};
use pipewright::graph::build::build_graph;
use pipewright::graph::link::Link;

fn diamond(
    log: &common::EventLog,
    a_fails: bool,
) -> Vec<std::sync::Arc<dyn pipewright::graph::step::Step>> {
    let root = FakeStep::new("root")
        .creates(Link::RootSource)
        .record_into(log);
    let mut a = FakeStep::new("a")
        .requires(Link::RootSource)
        .creates(Link::PipelineImage("x".to_string()))
        .record_into(log);
    if a_fails {
        a = a.fails();
    }
    let b = FakeStep::new("b")
        .requires(Link::RootSource)
        .creates(Link::PipelineImage("y".to_string()))
        .delayed(Duration::from_millis(50))
        .record_into(log);
    let join = FakeStep::new("join")
        .requires(Link::PipelineImage("x".to_string()))
        .requires(Link::PipelineImage("y".to_string()))
        .record_into(log);
    vec![root.arc(), a.arc(), b.arc(), join.arc()]
}

#[tokio::test]
async fn diamond_executes_every_node_once() {
    common::init_tracing();

    let log = event_log();
    let world = diamond(&log, false);
    let graph = build_graph(&world, &["join".to_string()]).expect("graph should build");

    let cancel = CancellationToken::new();
    let (report, result) = run_steps(&graph, &cancel, false).await;
    result.expect("run should succeed");

    let events = log.lock().unwrap().clone();
    for name in ["root", "a", "b", "join"] {
        let starts = events
            .iter()
            .filter(|event| **event == StepEvent::Started(name.to_string()))
            .count();
        assert_eq!(starts, 1, "step {name} should run exactly once");
    }

    // join begins strictly after both parents finished.
    let join_start = started_index(&events, "join").expect("join ran");
    assert!(finished_index(&events, "a").expect("a ran") < join_start);
    assert!(finished_index(&events, "b").expect("b ran") < join_start);
    // root finished before either branch started.
    assert!(finished_index(&events, "root").unwrap() < started_index(&events, "a").unwrap());
    assert!(finished_index(&events, "root").unwrap() < started_index(&events, "b").unwrap());

    assert_eq!(report.records.len(), 4);
    assert!(report
        .records
        .iter()
        .all(|record| record.outcome == StepOutcome::Succeeded));
}

#[tokio::test]
async fn mid_run_failure_cancels_descendants() {
    common::init_tracing();

    let log = event_log();
    let world = diamond(&log, true);
    let graph = build_graph(&world, &["join".to_string()]).expect("graph should build");

    let cancel = CancellationToken::new();
    let (report, result) = run_steps(&graph, &cancel, false).await;

    match result.expect_err("run should fail") {
        OperatorError::StepFailure { step, .. } => assert_eq!(step, "a"),
        other => panic!("expected StepFailure, got {other:?}"),
    }

    // join never ran.
    let events = log.lock().unwrap().clone();
    assert!(started_index(&events, "join").is_none());

    let join_record = report
        .records
        .iter()
        .find(|record| record.name == "join")
        .expect("join should be reported");
    assert_eq!(join_record.outcome, StepOutcome::Cancelled);
    assert_eq!(report.failures(), 1);
}

#[tokio::test]
async fn first_failure_wins() {
    let log = event_log();
    let world = vec![
        FakeStep::new("fast-fail").fails().record_into(&log).arc(),
        FakeStep::new("slow-fail")
            .fails()
            .delayed(Duration::from_millis(100))
            .record_into(&log)
            .arc(),
    ];
    let graph = build_graph(&world, &[]).expect("graph should build");

    let cancel = CancellationToken::new();
    let (_report, result) = run_steps(&graph, &cancel, false).await;
    match result.expect_err("run should fail") {
        OperatorError::StepFailure { step, .. } => assert_eq!(step, "fast-fail"),
        other => panic!("expected StepFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn external_cancellation_stops_the_run() {
    common::init_tracing();

    let log = event_log();
    let world = vec![
        FakeStep::new("long")
            .creates(Link::RootSource)
            .delayed(Duration::from_secs(30))
            .record_into(&log)
            .arc(),
        FakeStep::new("after").requires(Link::RootSource).record_into(&log).arc(),
    ];
    let graph = build_graph(&world, &[]).expect("graph should build");

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let (report, result) = run_steps(&graph, &cancel, false).await;
    assert!(matches!(
        result.expect_err("run should be interrupted"),
        OperatorError::Cancelled
    ));

    let events = log.lock().unwrap().clone();
    assert!(started_index(&events, "after").is_none());
    assert!(report
        .records
        .iter()
        .any(|record| record.outcome == StepOutcome::Cancelled));
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    let log = event_log();
    let world = diamond(&log, true);
    let graph = build_graph(&world, &["join".to_string()]).expect("graph should build");

    let cancel = CancellationToken::new();
    let (report, result) = run_steps(&graph, &cancel, true).await;
    result.expect("dry run always succeeds");

    assert!(log.lock().unwrap().is_empty(), "no run bodies in dry mode");
    assert_eq!(report.records.len(), 4);
    assert!(report
        .records
        .iter()
        .all(|record| record.outcome == StepOutcome::Succeeded));
}

#[tokio::test]
async fn finished_steps_are_elided() {
    let log = event_log();
    let world = vec![
        FakeStep::new("cached")
            .creates(Link::RootSource)
            .already_done()
            .record_into(&log)
            .arc(),
        FakeStep::new("fresh").requires(Link::RootSource).record_into(&log).arc(),
    ];
    let graph = build_graph(&world, &[]).expect("graph should build");

    let cancel = CancellationToken::new();
    let (report, result) = run_steps(&graph, &cancel, false).await;
    result.expect("run should succeed");

    let events = log.lock().unwrap().clone();
    assert!(started_index(&events, "cached").is_none());
    assert!(started_index(&events, "fresh").is_some());

    let cached = report
        .records
        .iter()
        .find(|record| record.name == "cached")
        .unwrap();
    assert_eq!(cached.outcome, StepOutcome::Skipped);
}

#[tokio::test]
async fn empty_graph_is_a_noop() {
    let world: Vec<std::sync::Arc<dyn pipewright::graph::step::Step>> = Vec::new();
    let graph = build_graph(&world, &[]).expect("empty graph builds");
    let cancel = CancellationToken::new();
    let (report, result) = run_steps(&graph, &cancel, false).await;
    result.expect("empty run succeeds");
    assert!(report.records.is_empty());
}
