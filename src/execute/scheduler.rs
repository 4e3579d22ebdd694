// src/execute/scheduler.rs

//! Concurrent, dependency-respecting step execution.
//!
//! A single supervisor owns all node state; workers are spawned tasks
//! that run one step each and report back over a completion channel.
//! The first failure cancels every running step (via a child token) and
//! every not-yet-dispatched descendant, then the supervisor drains
//! remaining workers before returning.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::OperatorError;
use crate::graph::build::StepGraph;
use crate::graph::step::StepError;

/// Per-node scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

/// How a step ended, for the execution report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// `run` returned success (or dry mode elided it).
    Succeeded,
    /// `done` reported the outputs already exist; `run` was elided.
    Skipped,
    Failed,
    Cancelled,
}

/// One step's result, as written into the JUnit report.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub duration: Duration,
    pub outcome: StepOutcome,
    pub message: Option<String>,
}

/// All step results from one graph execution, in completion order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub records: Vec<StepRecord>,
}

impl ExecutionReport {
    pub fn failures(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == StepOutcome::Failed)
            .count()
    }
}

struct Completion {
    index: usize,
    result: Result<StepOutcome, StepError>,
    duration: Duration,
}

/// Execute the graph. Returns the per-step report alongside the overall
/// result so callers can emit the report even when the run failed.
pub async fn run_steps(
    graph: &StepGraph,
    cancel: &CancellationToken,
    dry: bool,
) -> (ExecutionReport, Result<(), OperatorError>) {
    let node_count = graph.len();
    let mut report = ExecutionReport::default();
    if node_count == 0 {
        return (report, Ok(()));
    }

    // Child token: cancelling it stops our steps without affecting the
    // caller's token; an external cancel propagates down to it.
    let run_cancel = cancel.child_token();

    let mut state = vec![NodeState::Pending; node_count];
    let mut waiting: Vec<usize> = graph
        .nodes()
        .iter()
        .map(|node| node.parents.len())
        .collect();

    let (tx, mut rx) = mpsc::channel::<Completion>(node_count);
    let mut running = 0usize;
    let mut first_error: Option<OperatorError> = None;

    for &root in graph.roots() {
        dispatch(graph, root, &tx, &run_cancel, dry, &mut state, &mut running);
    }

    while running > 0 {
        let Some(completion) = rx.recv().await else {
            break;
        };
        running -= 1;
        let index = completion.index;
        let name = graph.nodes()[index].step.name().to_string();

        match completion.result {
            Ok(outcome) => {
                state[index] = NodeState::Done;
                debug!(step = %name, "step complete");
                report.records.push(StepRecord {
                    name,
                    duration: completion.duration,
                    outcome,
                    message: None,
                });
                for &child in &graph.nodes()[index].children {
                    waiting[child] = waiting[child].saturating_sub(1);
                    let ready = waiting[child] == 0 && state[child] == NodeState::Pending;
                    if ready && !run_cancel.is_cancelled() {
                        dispatch(graph, child, &tx, &run_cancel, dry, &mut state, &mut running);
                    }
                }
            }
            Err(StepError::Cancelled) => {
                state[index] = NodeState::Cancelled;
                report.records.push(StepRecord {
                    name: name.clone(),
                    duration: completion.duration,
                    outcome: StepOutcome::Cancelled,
                    message: Some("step was cancelled".to_string()),
                });
                if first_error.is_none() {
                    first_error = Some(OperatorError::Cancelled);
                }
                cancel_descendants(graph, index, &mut state, &mut report);
                run_cancel.cancel();
            }
            Err(StepError::Failed(err)) => {
                state[index] = NodeState::Failed;
                report.records.push(StepRecord {
                    name: name.clone(),
                    duration: completion.duration,
                    outcome: StepOutcome::Failed,
                    message: Some(format!("{err:#}")),
                });
                match first_error {
                    None => {
                        first_error = Some(OperatorError::StepFailure {
                            step: name,
                            source: err,
                        });
                    }
                    Some(_) => {
                        warn!(step = %name, error = %format!("{err:#}"), "secondary step failure");
                    }
                }
                cancel_descendants(graph, index, &mut state, &mut report);
                run_cancel.cancel();
            }
        }
    }

    // Anything still pending was never dispatched because of a failure
    // or an external interrupt.
    for index in 0..node_count {
        if state[index] == NodeState::Pending {
            state[index] = NodeState::Cancelled;
            report.records.push(StepRecord {
                name: graph.nodes()[index].step.name().to_string(),
                duration: Duration::ZERO,
                outcome: StepOutcome::Cancelled,
                message: Some("step was never dispatched".to_string()),
            });
        }
    }

    let result = match first_error {
        Some(err) => Err(err),
        None if state.iter().all(|&s| s == NodeState::Done) => Ok(()),
        None => Err(OperatorError::Cancelled),
    };

    (report, result)
}

fn dispatch(
    graph: &StepGraph,
    index: usize,
    tx: &mpsc::Sender<Completion>,
    cancel: &CancellationToken,
    dry: bool,
    state: &mut [NodeState],
    running: &mut usize,
) {
    state[index] = NodeState::Running;
    *running += 1;

    let step = graph.nodes()[index].step.clone();
    let tx = tx.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let result = execute_one(step.as_ref(), &cancel, dry).await;
        // The supervisor only drops the receiver after the loop exits, so
        // a send failure means the run is already over.
        let _ = tx
            .send(Completion {
                index,
                result,
                duration: started.elapsed(),
            })
            .await;
    });
}

async fn execute_one(
    step: &dyn crate::graph::step::Step,
    cancel: &CancellationToken,
    dry: bool,
) -> Result<StepOutcome, StepError> {
    if cancel.is_cancelled() {
        return Err(StepError::Cancelled);
    }

    if dry {
        info!(step = %step.name(), "dry run: would execute");
        return Ok(StepOutcome::Succeeded);
    }

    match step.done().await {
        Ok(true) => {
            info!(step = %step.name(), "outputs already present; skipping");
            return Ok(StepOutcome::Skipped);
        }
        Ok(false) => {}
        Err(StepError::Cancelled) => return Err(StepError::Cancelled),
        Err(err) => {
            debug!(step = %step.name(), error = %err, "done probe failed; running step");
        }
    }

    info!(step = %step.name(), "running step");
    step.run(cancel, dry).await.map(|_| StepOutcome::Succeeded)
}

/// Mark every not-yet-running descendant of `index` cancelled so it is
/// never dispatched. Running descendants observe the token instead.
fn cancel_descendants(
    graph: &StepGraph,
    index: usize,
    state: &mut [NodeState],
    report: &mut ExecutionReport,
) {
    let mut visited = std::collections::BTreeSet::new();
    let mut stack: Vec<usize> = graph.nodes()[index].children.clone();
    while let Some(next) = stack.pop() {
        if !visited.insert(next) {
            continue;
        }
        if state[next] == NodeState::Pending {
            state[next] = NodeState::Cancelled;
            debug!(
                step = %graph.nodes()[next].step.name(),
                "cancelling step: dependency failed"
            );
            report.records.push(StepRecord {
                name: graph.nodes()[next].step.name().to_string(),
                duration: Duration::ZERO,
                outcome: StepOutcome::Cancelled,
                message: Some(format!(
                    "dependency '{}' did not succeed",
                    graph.nodes()[index].step.name()
                )),
            });
        }
        stack.extend(graph.nodes()[next].children.iter().copied());
    }
}
