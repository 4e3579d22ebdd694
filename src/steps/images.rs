// src/steps/images.rs

//! Image steps: tagging external images into the workspace, building
//! pipeline images, and the aggregate "all images built" marker.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::client::ClusterClient;
use crate::cluster::PIPELINE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::config::model::{ImageBuildConfig, ImageTagReference};
use crate::graph::link::Link;
use crate::graph::step::{InputDefinition, Step, StepResult};
use crate::steps::cluster_step_err;

/// Tags an externally supplied base image into the pipeline stream.
pub struct InputImageStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    name: String,
    reference: ImageTagReference,
}

impl InputImageStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        name: String,
        reference: ImageTagReference,
    ) -> Self {
        Self {
            client,
            ctx,
            name,
            reference,
        }
    }
}

#[async_trait]
impl Step for InputImageStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Link> {
        Vec::new()
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::BaseImage(self.name.clone())]
    }

    /// Resolving the tag to its immutable digest pins the input: a
    /// repushed tag changes the workspace. Dry runs skip the remote
    /// probe and use the tag reference itself.
    async fn inputs(&self, _cancel: &CancellationToken, dry: bool) -> StepResult<InputDefinition> {
        if dry {
            return Ok(vec![self.reference.pull_spec()]);
        }
        let digest = self
            .client
            .resolve_image_tag(
                &self.reference.namespace,
                &self.reference.name,
                &self.reference.tag,
            )
            .await
            .map_err(cluster_step_err)?;
        Ok(vec![format!("{}@{}", self.reference.pull_spec(), digest)])
    }

    async fn run(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        self.client
            .tag_image(
                &self.reference.pull_spec(),
                self.ctx.namespace(),
                &format!("{PIPELINE_IMAGE_STREAM}:{}", self.name),
            )
            .await
            .map_err(cluster_step_err)
    }

    async fn done(&self) -> StepResult<bool> {
        self.client
            .image_tag_exists(self.ctx.namespace(), PIPELINE_IMAGE_STREAM, &self.name)
            .await
            .map_err(cluster_step_err)
    }
}

/// Imports an image from an external registry by pull spec.
pub struct ExternalImageStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    name: String,
    pull_spec: String,
}

impl ExternalImageStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        name: String,
        pull_spec: String,
    ) -> Self {
        Self {
            client,
            ctx,
            name,
            pull_spec,
        }
    }
}

#[async_trait]
impl Step for ExternalImageStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Link> {
        Vec::new()
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::ExternalImage(self.name.clone())]
    }

    async fn inputs(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<InputDefinition> {
        Ok(vec![self.pull_spec.clone()])
    }

    async fn run(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        self.client
            .tag_image(
                &self.pull_spec,
                self.ctx.namespace(),
                &format!("{PIPELINE_IMAGE_STREAM}:{}", self.name),
            )
            .await
            .map_err(cluster_step_err)
    }

    async fn done(&self) -> StepResult<bool> {
        self.client
            .image_tag_exists(self.ctx.namespace(), PIPELINE_IMAGE_STREAM, &self.name)
            .await
            .map_err(cluster_step_err)
    }
}

/// Builds a pipeline image by running commands on top of another
/// pipeline image (compiled binaries, test binaries, RPMs).
pub struct CommandBuildStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    name: String,
    from: String,
    commands: String,
}

impl CommandBuildStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        name: &str,
        from: &str,
        commands: String,
    ) -> Self {
        Self {
            client,
            ctx,
            name: name.to_string(),
            from: from.to_string(),
            commands,
        }
    }
}

#[async_trait]
impl Step for CommandBuildStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Link> {
        vec![Link::PipelineImage(self.from.clone())]
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::PipelineImage(self.name.clone())]
    }

    async fn run(&self, cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        let dockerfile = format!(
            "FROM {PIPELINE_IMAGE_STREAM}:{}\nRUN {}",
            self.from, self.commands
        );
        let manifest = build_manifest(self.ctx.namespace(), &self.name, dockerfile);
        self.client
            .run_build(self.ctx.namespace(), &manifest, cancel)
            .await
            .map_err(cluster_step_err)
    }

    async fn done(&self) -> StepResult<bool> {
        self.client
            .image_tag_exists(self.ctx.namespace(), PIPELINE_IMAGE_STREAM, &self.name)
            .await
            .map_err(cluster_step_err)
    }
}

/// Builds a configured output image from its Dockerfile.
pub struct ImageBuildStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    config: ImageBuildConfig,
    from: Link,
}

impl ImageBuildStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        config: ImageBuildConfig,
        from: Link,
    ) -> Self {
        Self {
            client,
            ctx,
            config,
            from,
        }
    }
}

#[async_trait]
impl Step for ImageBuildStep {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn requires(&self) -> Vec<Link> {
        vec![self.from.clone()]
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::PipelineImage(self.config.name.clone())]
    }

    async fn run(&self, cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        let from_tag = self.config.from.as_deref().unwrap_or("src");
        let namespace = self.ctx.namespace();
        let manifest = json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": {"name": self.config.name, "namespace": namespace},
            "spec": {
                "source": {
                    "type": "Image",
                    "images": [{
                        "from": {
                            "kind": "ImageStreamTag",
                            "name": format!("{PIPELINE_IMAGE_STREAM}:src"),
                        },
                        "paths": [{"sourcePath": "/", "destinationDir": "."}]
                    }],
                    "contextDir": self.config.context_dir.clone().unwrap_or_default(),
                },
                "strategy": {
                    "type": "Docker",
                    "dockerStrategy": {
                        "dockerfilePath": self.config.dockerfile_path.clone().unwrap_or_else(|| "Dockerfile".to_string()),
                        "from": {
                            "kind": "ImageStreamTag",
                            "name": format!("{PIPELINE_IMAGE_STREAM}:{from_tag}"),
                        }
                    }
                },
                "output": {
                    "to": {
                        "kind": "ImageStreamTag",
                        "name": format!("{PIPELINE_IMAGE_STREAM}:{}", self.config.name),
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
            .image_tag_exists(
                self.ctx.namespace(),
                PIPELINE_IMAGE_STREAM,
                &self.config.name,
            )
            .await
            .map_err(cluster_step_err)
    }
}

/// Barrier step marking every configured output image as built.
pub struct ImagesReadyStep {
    ctx: Arc<JobContext>,
    names: Vec<String>,
}

impl ImagesReadyStep {
    pub fn new(ctx: Arc<JobContext>, names: Vec<String>) -> Self {
        Self { ctx, names }
    }
}

#[async_trait]
impl Step for ImagesReadyStep {
    fn name(&self) -> &str {
        "images"
    }

    fn requires(&self) -> Vec<Link> {
        self.names
            .iter()
            .map(|name| Link::PipelineImage(name.clone()))
            .collect()
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::ImagesReady]
    }

    async fn run(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        info!(count = self.names.len(), "all output images built");
        Ok(())
    }

    fn provides(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(
            "IMAGE_FORMAT".to_string(),
            format!(
                "{}/{PIPELINE_IMAGE_STREAM}:${{component}}",
                self.ctx.namespace()
            ),
        );
        params
    }
}

fn build_manifest(namespace: &str, name: &str, dockerfile: String) -> serde_json::Value {
    json!({
        "apiVersion": "build.openshift.io/v1",
        "kind": "Build",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "source": {"type": "Dockerfile", "dockerfile": dockerfile},
            "strategy": {"type": "Docker", "dockerStrategy": {}},
            "output": {
                "to": {
                    "kind": "ImageStreamTag",
                    "name": format!("{PIPELINE_IMAGE_STREAM}:{name}"),
                }
            }
        }
    })
}
