// src/graph/step.rs

//! The step contract.
//!
//! The engine treats steps as an opaque capability set: what they require,
//! what they create, what contributes to the workspace fingerprint, and
//! how to execute them. Concrete step kinds live in `crate::steps`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::graph::link::Link;

/// Ordered list of opaque strings contributing to the workspace
/// fingerprint. Order is significant; duplicates are preserved.
pub type InputDefinition = Vec<String>;

/// Failure of a single step invocation.
///
/// Cancellation is distinguished from functional failure so the scheduler
/// can report the interrupted run instead of a spurious step error.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step was cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub type StepResult<T> = std::result::Result<T, StepError>;

/// A unit of work in the build graph.
///
/// Steps are constructed once, before execution, and never mutated while
/// the graph runs. Long-running `run` implementations must observe the
/// cancellation token and return promptly once it fires.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable human-readable name; used for targets and diagnostics.
    fn name(&self) -> &str;

    /// Links this step consumes.
    fn requires(&self) -> Vec<Link>;

    /// Links this step produces. Disjoint across all steps in a valid
    /// graph.
    fn creates(&self) -> Vec<Link>;

    /// Strings contributing to the workspace fingerprint. May perform
    /// idempotent read-only probes of external sources (e.g. resolve a
    /// tag to a digest); runs before the workspace exists.
    async fn inputs(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<InputDefinition> {
        Ok(Vec::new())
    }

    /// Execute the step.
    async fn run(&self, cancel: &CancellationToken, dry: bool) -> StepResult<()>;

    /// Cheap probe: do this step's outputs already exist? A `true` result
    /// lets the scheduler elide `run`.
    async fn done(&self) -> StepResult<bool> {
        Ok(false)
    }

    /// Parameter values this step offers to the template layer, keyed by
    /// parameter name. Orthogonal to the graph.
    fn provides(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}
