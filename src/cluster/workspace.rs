// src/cluster/workspace.rs

//! Workspace (namespace) initialization.
//!
//! Runs once, after the workspace name is derived and before any step.
//! Creation tolerates a namespace left Terminating by a previous run and
//! the authorization-cache race right after project creation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::cluster::client::{ClusterClient, ClusterError, NamespacePhase};
use crate::cluster::PIPELINE_IMAGE_STREAM;
use crate::config::job::JobContext;
use crate::errors::{OperatorError, Result};

const FORBIDDEN_RETRIES: u32 = 5;
const TERMINATING_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Default)]
pub struct WorkspaceOptions {
    /// Directories turned into opaque secrets inside the workspace.
    pub secret_dirs: Vec<PathBuf>,

    /// Delete the workspace after this much idle time; zero retains it.
    pub idle_cleanup: Duration,
}

/// Create the workspace and everything steps assume exists: the pipeline
/// image stream, secrets, and the idle-cleanup pod.
pub async fn initialize_workspace(
    client: &Arc<dyn ClusterClient>,
    ctx: &JobContext,
    options: &WorkspaceOptions,
) -> Result<()> {
    let namespace = ctx.namespace();
    let display_name = format!("{} - {}", namespace, ctx.spec.job);
    let description = ctx.source_description();

    info!(workspace = %namespace, "creating workspace");
    let mut forbidden_retries = FORBIDDEN_RETRIES;
    loop {
        match client
            .ensure_namespace(namespace, &display_name, &description)
            .await
        {
            Ok(NamespacePhase::Active) => break,
            Ok(NamespacePhase::Terminating) => {
                info!("waiting for workspace to finish terminating before creating another");
                sleep(TERMINATING_WAIT).await;
            }
            Err(ClusterError::Forbidden(message)) if forbidden_retries > 0 => {
                // Authorization caches lag right after project creation.
                forbidden_retries -= 1;
                warn!(error = %message, "workspace access forbidden; retrying");
                sleep(Duration::from_secs(1)).await;
            }
            Err(err) => {
                return Err(OperatorError::WorkspaceInit(format!(
                    "could not set up workspace: {err}"
                )));
            }
        }
    }

    if !options.idle_cleanup.is_zero() {
        create_cleanup_pod(client, namespace, options.idle_cleanup)
            .await
            .map_err(|err| OperatorError::WorkspaceInit(err.to_string()))?;
    }

    client
        .ensure_image_stream(namespace, PIPELINE_IMAGE_STREAM)
        .await
        .map_err(|err| {
            OperatorError::WorkspaceInit(format!("could not set up pipeline image stream: {err}"))
        })?;

    for dir in &options.secret_dirs {
        let name = dir
            .file_name()
            .map(|base| base.to_string_lossy().into_owned())
            .ok_or_else(|| {
                OperatorError::WorkspaceInit(format!("secret dir {dir:?} has no base name"))
            })?;
        client
            .ensure_secret_from_dir(namespace, &name, dir)
            .await
            .map_err(|err| {
                OperatorError::WorkspaceInit(format!("could not create secret '{name}': {err}"))
            })?;
    }

    Ok(())
}

/// A pod that deletes the workspace once no other run-once pod has been
/// running for the configured idle interval.
async fn create_cleanup_pod(
    client: &Arc<dyn ClusterClient>,
    namespace: &str,
    idle: Duration,
) -> std::result::Result<(), ClusterError> {
    info!(idle_seconds = idle.as_secs(), "workspace will be deleted after idle time");

    client.ensure_service_account(namespace, "cleanup").await?;
    client
        .ensure_role_binding(namespace, "cleanup", "cleanup", "admin")
        .await?;

    let script = r#"#!/bin/bash
set -euo pipefail
trap 'oc delete namespace ${NAMESPACE}' EXIT
count=0
while true; do
    alive="$( oc get pods -o go-template='{{ range .items }}{{ if and (not (eq .metadata.name "cleanup-when-idle")) (eq .spec.restartPolicy "Never") (or (eq .status.phase "Pending") (eq .status.phase "Running") (eq .status.phase "Unknown")) }}{{ .metadata.name }} {{ end }}{{ end }}' )"
    if [[ -n "${alive}" ]]; then
        count=0
        sleep "${WAIT}"
        continue
    fi
    if [[ "${count}" -lt 1 ]]; then
        count=$((count + 1))
        sleep "${WAIT}"
        continue
    fi
    echo "No pods running for more than ${WAIT}s, deleting workspace ..."
    exit 0
done
"#;

    let manifest = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "cleanup-when-idle", "namespace": namespace},
        "spec": {
            "activeDeadlineSeconds": 43200,
            "restartPolicy": "Never",
            "terminationGracePeriodSeconds": 30,
            "serviceAccountName": "cleanup",
            "containers": [{
                "name": "cleanup",
                "image": "openshift/origin-cli:latest",
                "env": [
                    {"name": "NAMESPACE", "valueFrom": {"fieldRef": {"fieldPath": "metadata.namespace"}}},
                    {"name": "WAIT", "value": idle.as_secs().to_string()}
                ],
                "command": ["/bin/bash", "-c"],
                "args": [script]
            }]
        }
    });

    client.create_pod(namespace, &manifest).await
}
