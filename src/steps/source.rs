// src/steps/source.rs

//! The source step: clones the repository under test and builds it into
//! the `pipeline:src` image every other build starts from.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cluster::client::ClusterClient;
use crate::cluster::PIPELINE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::graph::link::Link;
use crate::graph::step::{InputDefinition, Step, StepResult};
use crate::steps::cluster_step_err;

pub const SOURCE_TAG: &str = "src";

pub struct SourceStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
}

impl SourceStep {
    pub fn new(client: Arc<dyn ClusterClient>, ctx: Arc<JobContext>) -> Self {
        Self { client, ctx }
    }
}

#[async_trait]
impl Step for SourceStep {
    fn name(&self) -> &str {
        SOURCE_TAG
    }

    fn requires(&self) -> Vec<Link> {
        Vec::new()
    }

    fn creates(&self) -> Vec<Link> {
        vec![
            Link::RootSource,
            Link::PipelineImage(SOURCE_TAG.to_string()),
        ]
    }

    /// The resolved commit (and any merged pulls) pins the source input.
    async fn inputs(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<InputDefinition> {
        let refs = &self.ctx.spec.refs;
        let mut inputs = vec![format!(
            "{}/{}@{}",
            refs.org, refs.repo, refs.base_sha
        )];
        for pull in &refs.pulls {
            inputs.push(format!("#{}@{}", pull.number, pull.sha));
        }
        Ok(inputs)
    }

    async fn run(&self, cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        let refs = &self.ctx.spec.refs;
        let namespace = self.ctx.namespace();
        debug!(repo = %format!("{}/{}", refs.org, refs.repo), "building source image");

        let manifest = json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": {"name": SOURCE_TAG, "namespace": namespace},
            "spec": {
                "source": {
                    "type": "Git",
                    "git": {
                        "uri": format!("https://github.com/{}/{}.git", refs.org, refs.repo),
                        "ref": refs.base_ref,
                    }
                },
                "strategy": {"type": "Docker", "dockerStrategy": {}},
                "output": {
                    "to": {
                        "kind": "ImageStreamTag",
                        "name": format!("{PIPELINE_IMAGE_STREAM}:{SOURCE_TAG}"),
                    }
                }
            }
        });

        self.client
            .run_build(namespace, &manifest, cancel)
            .await
            .map_err(cluster_step_err)
    }

    async fn done(&self) -> StepResult<bool> {
        self.client
            .image_tag_exists(self.ctx.namespace(), PIPELINE_IMAGE_STREAM, SOURCE_TAG)
            .await
            .map_err(cluster_step_err)
    }
}
