// src/steps/rpm.rs

//! Serves the RPMs built by the `rpms` pipeline image over HTTP inside
//! the workspace so test pods can consume them as a yum repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::client::ClusterClient;
use crate::cluster::PIPELINE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::graph::link::Link;
use crate::graph::step::{Step, StepResult};
use crate::steps::cluster_step_err;

const RPM_SERVE_NAME: &str = "rpm-repo";

pub struct RpmServeStep {
    client: Arc<dyn ClusterClient>,
    ctx: Arc<JobContext>,
}

impl RpmServeStep {
    pub fn new(client: Arc<dyn ClusterClient>, ctx: Arc<JobContext>) -> Self {
        Self { client, ctx }
    }

    fn repo_url(&self) -> String {
        format!(
            "http://{RPM_SERVE_NAME}.{}.svc:8080",
            self.ctx.namespace()
        )
    }
}

#[async_trait]
impl Step for RpmServeStep {
    fn name(&self) -> &str {
        RPM_SERVE_NAME
    }

    fn requires(&self) -> Vec<Link> {
        vec![Link::PipelineImage("rpms".to_string())]
    }

    fn creates(&self) -> Vec<Link> {
        vec![Link::RpmRepo]
    }

    async fn run(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        let namespace = self.ctx.namespace();
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": RPM_SERVE_NAME,
                "namespace": namespace,
                "labels": {"app": RPM_SERVE_NAME},
            },
            "spec": {
                "restartPolicy": "Always",
                "containers": [{
                    "name": "serve",
                    "image": format!("{PIPELINE_IMAGE_STREAM}:rpms"),
                    "command": ["/bin/bash", "-c"],
                    "args": ["cd /srv/repo && exec python3 -m http.server 8080"],
                    "ports": [{"containerPort": 8080}]
                }]
            }
        });

        // The server stays up for the lifetime of the workspace; only its
        // creation is awaited.
        self.client
            .create_pod(namespace, &manifest)
            .await
            .map_err(cluster_step_err)?;
        info!(url = %self.repo_url(), "serving RPM repository");
        Ok(())
    }

    fn provides(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("RPM_REPO".to_string(), self.repo_url());
        params
    }
}
