// src/cluster/mod.rs

//! Cluster access.
//!
//! The engine consumes the cluster through the narrow [`ClusterClient`]
//! capability trait; [`oc`] implements it by driving the `oc` CLI, and
//! tests substitute an in-memory fake. [`workspace`] initializes the
//! content-addressed namespace a run executes in.

pub mod client;
pub mod oc;
pub mod workspace;

pub use client::{ClusterClient, ClusterError, NamespacePhase};
pub use oc::OcClient;
pub use workspace::{initialize_workspace, WorkspaceOptions};

/// Image stream that build steps write into.
pub const PIPELINE_IMAGE_STREAM: &str = "pipeline";

/// Image stream the release payload is imported into.
pub const STABLE_IMAGE_STREAM: &str = "stable";
