// src/execute/post.rs

//! Sequential post-run hooks.
//!
//! Post steps (e.g. promotion) are not part of the DAG: they run after
//! the graph completes successfully, in declaration order, and the first
//! error aborts the rest.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{OperatorError, Result};
use crate::graph::step::{Step, StepError};

pub async fn run_post_steps(
    steps: &[Arc<dyn Step>],
    cancel: &CancellationToken,
    dry: bool,
) -> Result<()> {
    for step in steps {
        if cancel.is_cancelled() {
            return Err(OperatorError::Cancelled);
        }
        info!(step = %step.name(), "running post step");
        step.run(cancel, dry).await.map_err(|err| match err {
            StepError::Cancelled => OperatorError::Cancelled,
            StepError::Failed(source) => OperatorError::StepFailure {
                step: step.name().to_string(),
                source,
            },
        })?;
    }
    Ok(())
}
