// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level build configuration as read from JSON.
///
/// Describes what to build and test:
///
/// ```json
/// {
///   "base_images": {"os": {"namespace": "openshift", "name": "origin-v4.0", "tag": "base"}},
///   "binary_build_commands": "make build",
///   "images": [{"name": "controller", "from": "bin"}],
///   "tests": [{"name": "unit", "from": "src", "commands": "make test"}]
/// }
/// ```
///
/// All sections are optional; an empty configuration produces a graph with
/// only the source step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildConfiguration {
    /// Externally supplied images tagged into the workspace by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub base_images: BTreeMap<String, ImageTagReference>,

    /// Externally imported images by registry pull spec.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_images: BTreeMap<String, String>,

    /// Commands that compile the project binaries from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_build_commands: Option<String>,

    /// Commands that compile the test binaries from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_binary_build_commands: Option<String>,

    /// Commands that build RPMs from the compiled binaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_build_commands: Option<String>,

    /// Output images built into the pipeline image stream.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageBuildConfig>,

    /// Test stages run against built images.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestStageConfig>,

    /// Release payload to import before tests that need it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseTagConfiguration>,

    /// Where built images are published when promotion runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionConfiguration>,
}

impl BuildConfiguration {
    /// Canonical serialization used for the workspace fingerprint.
    ///
    /// Field order is fixed by the struct definition and map keys are
    /// sorted (`BTreeMap`), so equal configurations serialize identically.
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A reference to an image stream tag outside the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageTagReference {
    /// Namespace the tag lives in; empty means the run's base namespace.
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

impl ImageTagReference {
    /// The `namespace/name:tag` pull spec used with the cluster client.
    pub fn pull_spec(&self) -> String {
        format!("{}/{}:{}", self.namespace, self.name, self.tag)
    }
}

/// An output image built into the pipeline image stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageBuildConfig {
    pub name: String,

    /// Pipeline or base image the build starts from; defaults to `src`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,
}

/// A test stage: commands run in a pod using a pipeline image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestStageConfig {
    /// Stage name; template files may omit it and take their file stem.
    #[serde(default)]
    pub name: String,

    /// Pipeline image the test runs on; defaults to `src`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    pub commands: String,

    /// Directory inside the test container to collect artifacts from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<String>,
}

impl TestStageConfig {
    pub fn effective_from(&self) -> &str {
        self.from.as_deref().unwrap_or("src")
    }
}

/// The release payload image stream to import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseTagConfiguration {
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

/// Where images are promoted after a fully successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromotionConfiguration {
    /// Target namespace; defaults to the release configuration namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Target image stream name; defaults to the release stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Extra images to promote, mapping target name to pipeline tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_images: BTreeMap<String, String>,
}
