// src/cluster/oc.rs

//! `ClusterClient` implementation driving the `oc` CLI.
//!
//! Every operation shells out to `oc` with JSON manifests piped over
//! stdin and JSON or jsonpath output parsed back. Long waits (pods,
//! builds) poll the resource phase and observe cancellation between
//! polls.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cluster::client::{ClusterClient, ClusterError, ClusterResult, NamespacePhase};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct OcClient {
    binary: String,
}

impl OcClient {
    pub fn new() -> Self {
        Self {
            binary: "oc".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `kubectl` in tests).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn oc(&self, args: &[&str]) -> ClusterResult<String> {
        debug!(args = ?args, "invoking {}", self.binary);
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("running {} {}", self.binary, args.join(" ")))
            .map_err(ClusterError::Failed)?;
        classify_output(args, output)
    }

    async fn oc_with_stdin(&self, args: &[&str], input: &[u8]) -> ClusterResult<String> {
        debug!(args = ?args, "invoking {} with stdin", self.binary);
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {} {}", self.binary, args.join(" ")))
            .map_err(ClusterError::Failed)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .await
                .context("writing manifest to stdin")
                .map_err(ClusterError::Failed)?;
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for {} {}", self.binary, args.join(" ")))
            .map_err(ClusterError::Failed)?;
        classify_output(args, output)
    }

    /// `oc apply` with create-or-update semantics.
    async fn apply(&self, namespace: Option<&str>, manifest: &Value) -> ClusterResult<String> {
        let payload = serde_json::to_vec(manifest)
            .context("serializing manifest")
            .map_err(ClusterError::Failed)?;
        let mut args = vec!["apply", "-f", "-"];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        self.oc_with_stdin(&args, &payload).await
    }

    /// Poll a resource's phase until it reaches a terminal value or the
    /// run is cancelled.
    async fn wait_for_phase(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
        success: &[&str],
        failure: &[&str],
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        loop {
            let phase = self
                .oc(&[
                    "get",
                    kind,
                    name,
                    "-n",
                    namespace,
                    "-o",
                    "jsonpath={.status.phase}",
                ])
                .await?;
            let phase = phase.trim();
            if success.contains(&phase) {
                return Ok(());
            }
            if failure.contains(&phase) {
                return Err(ClusterError::Failed(anyhow!(
                    "{kind} '{name}' ended in phase {phase}"
                )));
            }
            debug!(kind, name, phase, "waiting for completion");

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClusterError::Cancelled),
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

impl Default for OcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for OcClient {
    async fn ensure_namespace(
        &self,
        name: &str,
        display_name: &str,
        description: &str,
    ) -> ClusterResult<NamespacePhase> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": name,
                "annotations": {
                    "openshift.io/display-name": display_name,
                    "openshift.io/description": description,
                }
            }
        });
        self.apply(None, &manifest).await?;

        let phase = self
            .oc(&["get", "namespace", name, "-o", "jsonpath={.status.phase}"])
            .await?;
        match phase.trim() {
            "Terminating" => Ok(NamespacePhase::Terminating),
            _ => Ok(NamespacePhase::Active),
        }
    }

    async fn ensure_image_stream(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let manifest = json!({
            "apiVersion": "image.openshift.io/v1",
            "kind": "ImageStream",
            "metadata": {"name": name, "namespace": namespace},
            "spec": {"lookupPolicy": {"local": true}}
        });
        self.apply(Some(namespace), &manifest).await?;
        Ok(())
    }

    async fn ensure_secret_from_dir(
        &self,
        namespace: &str,
        name: &str,
        dir: &Path,
    ) -> ClusterResult<()> {
        let from_file = format!("--from-file={}", dir.display());
        let rendered = self
            .oc(&[
                "create",
                "secret",
                "generic",
                name,
                &from_file,
                "-n",
                namespace,
                "--dry-run=client",
                "-o",
                "json",
            ])
            .await?;
        self.oc_with_stdin(&["apply", "-n", namespace, "-f", "-"], rendered.as_bytes())
            .await?;
        info!(secret = %name, "ensured secret");
        Ok(())
    }

    async fn ensure_service_account(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": {"name": name, "namespace": namespace}
        });
        self.apply(Some(namespace), &manifest).await?;
        Ok(())
    }

    async fn ensure_role_binding(
        &self,
        namespace: &str,
        name: &str,
        service_account: &str,
        role: &str,
    ) -> ClusterResult<()> {
        let manifest = json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "RoleBinding",
            "metadata": {"name": name, "namespace": namespace},
            "subjects": [{"kind": "ServiceAccount", "name": service_account, "namespace": namespace}],
            "roleRef": {"kind": "ClusterRole", "name": role, "apiGroup": "rbac.authorization.k8s.io"}
        });
        self.apply(Some(namespace), &manifest).await?;
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, manifest: &Value) -> ClusterResult<()> {
        self.apply(Some(namespace), manifest).await?;
        Ok(())
    }

    async fn run_pod(
        &self,
        namespace: &str,
        manifest: &Value,
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        let name = manifest_name(manifest)?;
        self.apply(Some(namespace), manifest).await?;
        self.wait_for_phase(
            namespace,
            "pod",
            &name,
            &["Succeeded"],
            &["Failed", "Unknown"],
            cancel,
        )
        .await
    }

    async fn run_build(
        &self,
        namespace: &str,
        manifest: &Value,
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        let name = manifest_name(manifest)?;
        self.apply(Some(namespace), manifest).await?;
        self.wait_for_phase(
            namespace,
            "build",
            &name,
            &["Complete"],
            &["Failed", "Error", "Cancelled"],
            cancel,
        )
        .await
    }

    async fn tag_image(
        &self,
        source: &str,
        target_namespace: &str,
        target: &str,
    ) -> ClusterResult<()> {
        let target_ref = format!("{target_namespace}/{target}");
        if is_registry_pull_spec(source) {
            self.oc(&["tag", "--source=docker", source, &target_ref])
                .await?;
        } else {
            self.oc(&["tag", source, &target_ref]).await?;
        }
        Ok(())
    }

    async fn resolve_image_tag(
        &self,
        namespace: &str,
        name: &str,
        tag: &str,
    ) -> ClusterResult<String> {
        let istag = format!("{name}:{tag}");
        let digest = self
            .oc(&[
                "get",
                "istag",
                &istag,
                "-n",
                namespace,
                "-o",
                "jsonpath={.image.metadata.name}",
            ])
            .await?;
        let digest = digest.trim().to_string();
        if digest.is_empty() {
            return Err(ClusterError::Failed(anyhow!(
                "image stream tag {namespace}/{istag} has no image"
            )));
        }
        Ok(digest)
    }

    async fn image_tag_exists(
        &self,
        namespace: &str,
        stream: &str,
        tag: &str,
    ) -> ClusterResult<bool> {
        let istag = format!("{stream}:{tag}");
        match self.oc(&["get", "istag", &istag, "-n", namespace]).await {
            Ok(_) => Ok(true),
            Err(ClusterError::Failed(err)) if format!("{err:#}").contains("NotFound") => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// First path segment with a dot or port marks a registry pull spec
/// rather than an in-cluster image stream tag.
fn is_registry_pull_spec(source: &str) -> bool {
    source
        .split('/')
        .next()
        .map(|host| host.contains('.') || host.contains(':'))
        .unwrap_or(false)
}

fn manifest_name(manifest: &Value) -> ClusterResult<String> {
    manifest["metadata"]["name"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ClusterError::Failed(anyhow!("manifest has no metadata.name")))
}

fn classify_output(args: &[&str], output: std::process::Output) -> ClusterResult<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if stderr.to_lowercase().contains("forbidden") {
        return Err(ClusterError::Forbidden(stderr.trim().to_string()));
    }
    Err(ClusterError::Failed(anyhow!(
        "oc {} exited with {}: {}",
        args.join(" "),
        output.status,
        stderr.trim()
    )))
}
