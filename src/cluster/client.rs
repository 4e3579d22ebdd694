// src/cluster/client.rs

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Cluster operation failure.
///
/// `Forbidden` is split out because workspace creation races the
/// cluster's authorization cache and is retried; `Cancelled` is split
/// out so interrupts are not misreported as step failures.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("operation was cancelled")]
    Cancelled,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespacePhase {
    Active,
    Terminating,
}

/// The capability set the engine needs from the cluster.
///
/// All mutations have create-or-update semantics: an already-existing
/// resource is updated or left in place, never reported as an error.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create the namespace if needed and report its phase.
    async fn ensure_namespace(
        &self,
        name: &str,
        display_name: &str,
        description: &str,
    ) -> ClusterResult<NamespacePhase>;

    async fn ensure_image_stream(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    /// Create or update an opaque secret from the files of a directory.
    async fn ensure_secret_from_dir(
        &self,
        namespace: &str,
        name: &str,
        dir: &Path,
    ) -> ClusterResult<()>;

    async fn ensure_service_account(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    async fn ensure_role_binding(
        &self,
        namespace: &str,
        name: &str,
        service_account: &str,
        role: &str,
    ) -> ClusterResult<()>;

    /// Create a pod and return without waiting for it.
    async fn create_pod(&self, namespace: &str, manifest: &Value) -> ClusterResult<()>;

    /// Create a pod and wait until it succeeds; a failed pod is an error.
    async fn run_pod(
        &self,
        namespace: &str,
        manifest: &Value,
        cancel: &CancellationToken,
    ) -> ClusterResult<()>;

    /// Create a build and wait until it completes; a failed build is an
    /// error.
    async fn run_build(
        &self,
        namespace: &str,
        manifest: &Value,
        cancel: &CancellationToken,
    ) -> ClusterResult<()>;

    /// Tag `source` (an image stream tag or pull spec) into
    /// `namespace/target`.
    async fn tag_image(
        &self,
        source: &str,
        target_namespace: &str,
        target: &str,
    ) -> ClusterResult<()>;

    /// Resolve an image stream tag to its immutable image digest.
    async fn resolve_image_tag(
        &self,
        namespace: &str,
        name: &str,
        tag: &str,
    ) -> ClusterResult<String>;

    /// Whether `stream:tag` already exists in the namespace.
    async fn image_tag_exists(
        &self,
        namespace: &str,
        stream: &str,
        tag: &str,
    ) -> ClusterResult<bool>;
}
