// src/steps/promote.rs

//! Promotion: after a fully successful run, tag the built output images
//! into the configured release streams. Runs as a post step, outside the
//! DAG.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::client::ClusterClient;
use crate::cluster::PIPELINE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::config::model::BuildConfiguration;
use crate::graph::link::Link;
use crate::graph::step::{Step, StepError, StepResult};
use crate::steps::cluster_step_err;

pub struct PromotionStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    config: BuildConfiguration,
}

impl PromotionStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        config: BuildConfiguration,
    ) -> Self {
        Self {
            client,
            ctx,
            config,
        }
    }

    /// Promotion target stream, from the promotion config with the
    /// release config as fallback.
    fn target(&self) -> Option<(String, String)> {
        let promotion = self.config.promotion.as_ref();
        let release = self.config.release.as_ref();
        let namespace = promotion
            .and_then(|p| p.namespace.clone())
            .or_else(|| release.map(|r| r.namespace.clone()))?;
        let name = promotion
            .and_then(|p| p.name.clone())
            .or_else(|| release.map(|r| r.name.clone()))?;
        Some((namespace, name))
    }
}

#[async_trait]
impl Step for PromotionStep {
    fn name(&self) -> &str {
        "promotion"
    }

    fn requires(&self) -> Vec<Link> {
        vec![Link::ImagesReady]
    }

    fn creates(&self) -> Vec<Link> {
        Vec::new()
    }

    async fn run(&self, _cancel: &CancellationToken, dry: bool) -> StepResult<()> {
        let (target_namespace, stream) = self.target().ok_or_else(|| {
            StepError::Failed(anyhow!(
                "promotion requested but neither promotion nor release configuration names a target"
            ))
        })?;
        let source_namespace = self.ctx.namespace();

        let mut tags: Vec<(String, String)> = self
            .config
            .images
            .iter()
            .map(|image| (image.name.clone(), image.name.clone()))
            .collect();
        if let Some(promotion) = &self.config.promotion {
            for (target_name, pipeline_tag) in &promotion.additional_images {
                tags.push((pipeline_tag.clone(), target_name.clone()));
            }
        }

        for (pipeline_tag, target_name) in tags {
            let source = format!("{source_namespace}/{PIPELINE_IMAGE_STREAM}:{pipeline_tag}");
            let target = format!("{stream}:{target_name}");
            if dry {
                info!(source = %source, target = %format!("{target_namespace}/{target}"), "dry run: would promote");
                continue;
            }
            info!(source = %source, target = %format!("{target_namespace}/{target}"), "promoting image");
            self.client
                .tag_image(&source, &target_namespace, &target)
                .await
                .map_err(cluster_step_err)?;
        }
        Ok(())
    }
}
