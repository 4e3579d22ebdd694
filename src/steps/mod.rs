// src/steps/mod.rs

//! Concrete step construction.
//!
//! [`from_config`] turns the build configuration into the world of steps
//! the graph builder wires together, plus the sequential post steps.

pub mod images;
pub mod promote;
pub mod release;
pub mod rpm;
pub mod source;
pub mod test;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;

use crate::cluster::client::{ClusterClient, ClusterError};
use crate::config::job::JobContext;
use crate::config::model::{BuildConfiguration, TestStageConfig};
use crate::errors::{OperatorError, Result};
use crate::graph::link::Link;
use crate::graph::step::{Step, StepError};

pub use images::{CommandBuildStep, ExternalImageStep, ImageBuildStep, ImagesReadyStep, InputImageStep};
pub use promote::PromotionStep;
pub use release::ReleaseImagesStep;
pub use rpm::RpmServeStep;
pub use source::SourceStep;
pub use test::TestStep;

/// The constructed world plus the post-run hooks.
pub struct StepSet {
    pub steps: Vec<Arc<dyn Step>>,
    pub post_steps: Vec<Arc<dyn Step>>,
}

impl std::fmt::Debug for StepSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSet")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("post_steps", &self.post_steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Build the world of steps from the configuration.
///
/// Construction order is stable: the workspace fingerprint folds step
/// inputs in this order.
pub fn from_config(
    config: &BuildConfiguration,
    ctx: &Arc<JobContext>,
    client: &Arc<dyn ClusterClient>,
    extra_tests: &[TestStageConfig],
    promote: bool,
) -> Result<StepSet> {
    let mut steps: Vec<Arc<dyn Step>> = Vec::new();

    steps.push(Arc::new(SourceStep::new(client.clone(), ctx.clone())));

    for (name, reference) in &config.base_images {
        let mut reference = reference.clone();
        if reference.namespace.is_empty() {
            reference.namespace = ctx.base_namespace.clone();
        }
        steps.push(Arc::new(InputImageStep::new(
            client.clone(),
            ctx.clone(),
            name.clone(),
            reference,
        )));
    }

    for (name, pull_spec) in &config.external_images {
        steps.push(Arc::new(ExternalImageStep::new(
            client.clone(),
            ctx.clone(),
            name.clone(),
            pull_spec.clone(),
        )));
    }

    if let Some(release) = &config.release {
        steps.push(Arc::new(ReleaseImagesStep::new(
            client.clone(),
            ctx.clone(),
            release.clone(),
        )));
    }

    if let Some(commands) = &config.binary_build_commands {
        steps.push(Arc::new(CommandBuildStep::new(
            client.clone(),
            ctx.clone(),
            "bin",
            "src",
            commands.clone(),
        )));
    }

    if let Some(commands) = &config.test_binary_build_commands {
        steps.push(Arc::new(CommandBuildStep::new(
            client.clone(),
            ctx.clone(),
            "test-bin",
            "src",
            commands.clone(),
        )));
    }

    if let Some(commands) = &config.rpm_build_commands {
        let from = match config.binary_build_commands.is_some() {
            true => "bin",
            false => "src",
        };
        steps.push(Arc::new(CommandBuildStep::new(
            client.clone(),
            ctx.clone(),
            "rpms",
            from,
            commands.clone(),
        )));
        steps.push(Arc::new(RpmServeStep::new(client.clone(), ctx.clone())));
    }

    for image in &config.images {
        let from = image.from.as_deref().unwrap_or("src");
        steps.push(Arc::new(ImageBuildStep::new(
            client.clone(),
            ctx.clone(),
            image.clone(),
            image_link(config, from),
        )));
    }

    if !config.images.is_empty() {
        let names = config.images.iter().map(|image| image.name.clone()).collect();
        steps.push(Arc::new(ImagesReadyStep::new(ctx.clone(), names)));
    }

    for stage in config.tests.iter().chain(extra_tests) {
        let from = stage.effective_from();
        steps.push(Arc::new(TestStep::new(
            client.clone(),
            ctx.clone(),
            stage.clone(),
            image_link(config, from),
        )));
    }

    ensure_unique_step_names(&steps)?;

    let mut post_steps: Vec<Arc<dyn Step>> = Vec::new();
    if promote {
        post_steps.push(Arc::new(PromotionStep::new(
            client.clone(),
            ctx.clone(),
            config.clone(),
        )));
    }

    Ok(StepSet { steps, post_steps })
}

/// The link an image name refers to: a base image, an external image, or
/// an image built into the pipeline.
pub fn image_link(config: &BuildConfiguration, name: &str) -> Link {
    if config.base_images.contains_key(name) {
        Link::BaseImage(name.to_string())
    } else if config.external_images.contains_key(name) {
        Link::ExternalImage(name.to_string())
    } else {
        Link::PipelineImage(name.to_string())
    }
}

fn ensure_unique_step_names(steps: &[Arc<dyn Step>]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for step in steps {
        if !seen.insert(step.name().to_string()) {
            return Err(OperatorError::ConfigurationInvalid(format!(
                "two steps would be named '{}'; rename the image or test",
                step.name()
            )));
        }
    }
    Ok(())
}

/// Translate a cluster failure into the step contract's error kinds.
pub(crate) fn cluster_step_err(err: ClusterError) -> StepError {
    match err {
        ClusterError::Cancelled => StepError::Cancelled,
        ClusterError::Forbidden(message) => StepError::Failed(anyhow!("forbidden: {message}")),
        ClusterError::Failed(source) => StepError::Failed(source),
    }
}
