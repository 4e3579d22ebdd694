// src/errors.rs

//! Crate-wide error type.
//!
//! Every failure surfaced to the caller is one of these kinds, so the CLI
//! can distinguish a bad configuration from a failed step from an
//! interrupt without string matching.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error("unsatisfied dependency: {0}")]
    UnsatisfiedDependency(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("input resolution failed for step '{step}': {source}")]
    InputResolution {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("workspace initialization failed: {0}")]
    WorkspaceInit(String),

    #[error("step '{step}' failed: {source}")]
    StepFailure {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("execution was interrupted")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OperatorError>;
