// src/config/mod.rs

//! Configuration loading and validation.
//!
//! The build configuration is a JSON document read from `--config` or the
//! `CONFIG_SPEC` environment variable, with an optional override document
//! merged on top. The job descriptor comes from `JOB_SPEC` or a
//! `--git-ref` shorthand.

pub mod job;
pub mod loader;
pub mod model;

pub use job::{JobContext, JobSpec, JobType, Pull, Refs};
pub use loader::load_configuration;
pub use model::{
    BuildConfiguration, ImageBuildConfig, ImageTagReference, PromotionConfiguration,
    ReleaseTagConfiguration, TestStageConfig,
};
