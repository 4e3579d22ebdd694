// src/steps/test.rs

//! Test stages: run the configured commands in a pod using a built
//! pipeline image, waiting for the pod to succeed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cluster::client::ClusterClient;
use crate::cluster::PIPELINE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::config::model::TestStageConfig;
use crate::graph::link::Link;
use crate::graph::step::{Step, StepResult};
use crate::steps::cluster_step_err;

pub struct TestStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
    config: TestStageConfig,
    from: Link,
}

impl TestStep {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ctx: Arc<JobContext>,
        config: TestStageConfig,
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
impl Step for TestStep {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn requires(&self) -> Vec<Link> {
        vec![self.from.clone()]
    }

    fn creates(&self) -> Vec<Link> {
        Vec::new()
    }

    async fn run(&self, cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        let namespace = self.ctx.namespace();
        let pod_name = format!("test-{}", self.config.name);
        debug!(test = %self.config.name, pod = %pod_name, "starting test pod");

        let mut container = json!({
            "name": "test",
            "image": format!("{PIPELINE_IMAGE_STREAM}:{}", self.config.effective_from()),
            "command": ["/bin/sh", "-c", self.config.commands],
        });
        if let Some(artifact_dir) = &self.config.artifact_dir {
            container["volumeMounts"] = json!([{"name": "artifacts", "mountPath": artifact_dir}]);
        }

        let mut spec = json!({
            "restartPolicy": "Never",
            "containers": [container],
        });
        if self.config.artifact_dir.is_some() {
            spec["volumes"] = json!([{"name": "artifacts", "emptyDir": {}}]);
        }

        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": pod_name, "namespace": namespace},
            "spec": spec,
        });

        self.client
            .run_pod(namespace, &manifest, cancel)
            .await
            .map_err(cluster_step_err)
    }
}
