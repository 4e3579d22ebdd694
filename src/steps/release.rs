// src/steps/release.rs

//! Imports the configured release payload into the workspace's `stable`
//! image stream for tests that exercise a full release.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cluster::client::ClusterClient;
use crate::cluster::STABLE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::config::model::ReleaseTagConfiguration;
use crate::graph::link::Link;
use crate::graph::step::{InputDefinition, Step, StepError, StepResult};
use crate::steps::cluster_step_err;

pub struct ReleaseImagesStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    config: ReleaseTagConfiguration,
}

impl ReleaseImagesStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        config: ReleaseTagConfiguration,
    ) -> Self {
        Self {
            client,
            ctx,
            config,
        }
    }
}

#[async_trait]
impl Step for ReleaseImagesStep {
    fn name(&self) -> &str {
        "release-inputs"
    }

    fn requires(&self) -> Vec<Link> {
        Vec::new()
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::ReleaseImages]
    }

    /// The release tag configuration itself pins the input: importing a
    /// different payload must land in a different workspace.
    async fn inputs(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<InputDefinition> {
        let serialized = serde_json::to_string(&self.config)
            .map_err(|err| StepError::Failed(err.into()))?;
        Ok(vec![serialized])
    }

    async fn run(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        let namespace = self.ctx.namespace();
        self.client
            .ensure_image_stream(namespace, STABLE_IMAGE_STREAM)
            .await
            .map_err(cluster_step_err)?;
        let source = format!(
            "{}/{}:{}",
            self.config.namespace, self.config.name, self.config.tag
        );
        self.client
            .tag_image(
                &source,
                namespace,
                &format!("{STABLE_IMAGE_STREAM}:{}", self.config.tag),
            )
            .await
            .map_err(cluster_step_err)
    }

    async fn done(&self) -> StepResult<bool> {
        self.client
            .image_tag_exists(self.ctx.namespace(), STABLE_IMAGE_STREAM, &self.config.tag)
            .await
            .map_err(cluster_step_err)
    }
}
