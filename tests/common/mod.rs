// Shared helpers; each test binary uses a different subset.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use pipewright::cluster::client::{ClusterClient, ClusterResult, NamespacePhase};
use pipewright::config::job::{JobContext, JobSpec, JobType, Refs};
use pipewright::graph::link::Link;
use pipewright::graph::step::{InputDefinition, Step, StepResult};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Execution trace shared between fake steps and assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepEvent {
    Started(String),
    Finished(String),
}

pub type EventLog = Arc<Mutex<Vec<StepEvent>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[allow(dead_code)]
pub fn started_index(log: &[StepEvent], name: &str) -> Option<usize> {
    log.iter()
        .position(|event| *event == StepEvent::Started(name.to_string()))
}

#[allow(dead_code)]
pub fn finished_index(log: &[StepEvent], name: &str) -> Option<usize> {
    log.iter()
        .position(|event| *event == StepEvent::Finished(name.to_string()))
}

/// A configurable step for engine tests: declares links and inputs, and
/// records its execution into a shared event log.
pub struct FakeStep {
    name: String,
    requires: Vec<Link>,
    creates: Vec<Link>,
    inputs: Vec<String>,
    fail: bool,
    done: bool,
    delay: Duration,
    log: Option<EventLog>,
}

#[allow(dead_code)]
impl FakeStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            requires: Vec::new(),
            creates: Vec::new(),
            inputs: Vec::new(),
            fail: false,
            done: false,
            delay: Duration::ZERO,
            log: None,
        }
    }

    pub fn requires(mut self, link: Link) -> Self {
        self.requires.push(link);
        self
    }

    pub fn creates(mut self, link: Link) -> Self {
        self.creates.push(link);
        self
    }

    pub fn input(mut self, value: &str) -> Self {
        self.inputs.push(value.to_string());
        self
    }

    pub fn fails(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn already_done(mut self) -> Self {
        self.done = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn record_into(mut self, log: &EventLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn arc(self) -> Arc<dyn Step> {
        Arc::new(self)
    }

    fn record(&self, event: StepEvent) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(event);
        }
    }
}

#[async_trait]
impl Step for FakeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Link> {
        self.requires.clone()
    }

    fn creates(&self) -> Vec<Link> {
        self.creates.clone()
    }

    async fn inputs(&self, _cancel: &CancellationToken, _dry: bool) -> StepResult<InputDefinition> {
        Ok(self.inputs.clone())
    }

    async fn run(&self, cancel: &CancellationToken, _dry: bool) -> StepResult<()> {
        self.record(StepEvent::Started(self.name.clone()));
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.record(StepEvent::Finished(self.name.clone()));
                    return Err(pipewright::graph::step::StepError::Cancelled);
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        self.record(StepEvent::Finished(self.name.clone()));
        if self.fail {
            return Err(anyhow::anyhow!("injected failure").into());
        }
        Ok(())
    }

    async fn done(&self) -> StepResult<bool> {
        Ok(self.done)
    }
}

/// In-memory cluster client: every operation succeeds and is recorded.
#[derive(Default)]
pub struct FakeCluster {
    pub operations: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, operation: String) {
        self.operations.lock().unwrap().push(operation);
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn ensure_namespace(
        &self,
        name: &str,
        _display_name: &str,
        _description: &str,
    ) -> ClusterResult<NamespacePhase> {
        self.record(format!("ensure_namespace {name}"));
        Ok(NamespacePhase::Active)
    }

    async fn ensure_image_stream(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.record(format!("ensure_image_stream {namespace}/{name}"));
        Ok(())
    }

    async fn ensure_secret_from_dir(
        &self,
        namespace: &str,
        name: &str,
        _dir: &Path,
    ) -> ClusterResult<()> {
        self.record(format!("ensure_secret {namespace}/{name}"));
        Ok(())
    }

    async fn ensure_service_account(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.record(format!("ensure_service_account {namespace}/{name}"));
        Ok(())
    }

    async fn ensure_role_binding(
        &self,
        namespace: &str,
        name: &str,
        _service_account: &str,
        _role: &str,
    ) -> ClusterResult<()> {
        self.record(format!("ensure_role_binding {namespace}/{name}"));
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, manifest: &Value) -> ClusterResult<()> {
        let name = manifest["metadata"]["name"].as_str().unwrap_or("<unnamed>");
        self.record(format!("create_pod {namespace}/{name}"));
        Ok(())
    }

    async fn run_pod(
        &self,
        namespace: &str,
        manifest: &Value,
        _cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        let name = manifest["metadata"]["name"].as_str().unwrap_or("<unnamed>");
        self.record(format!("run_pod {namespace}/{name}"));
        Ok(())
    }

    async fn run_build(
        &self,
        namespace: &str,
        manifest: &Value,
        _cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        let name = manifest["metadata"]["name"].as_str().unwrap_or("<unnamed>");
        self.record(format!("run_build {namespace}/{name}"));
        Ok(())
    }

    async fn tag_image(
        &self,
        source: &str,
        target_namespace: &str,
        target: &str,
    ) -> ClusterResult<()> {
        self.record(format!("tag_image {source} -> {target_namespace}/{target}"));
        Ok(())
    }

    async fn resolve_image_tag(
        &self,
        namespace: &str,
        name: &str,
        tag: &str,
    ) -> ClusterResult<String> {
        self.record(format!("resolve_image_tag {namespace}/{name}:{tag}"));
        Ok(format!("sha256:fake-{name}-{tag}"))
    }

    async fn image_tag_exists(
        &self,
        namespace: &str,
        stream: &str,
        tag: &str,
    ) -> ClusterResult<bool> {
        self.record(format!("image_tag_exists {namespace}/{stream}:{tag}"));
        Ok(false)
    }
}

/// A job context for tests, with the workspace already assigned.
#[allow(dead_code)]
pub fn job_context(namespace: &str) -> Arc<JobContext> {
    let spec = JobSpec {
        job_type: JobType::Presubmit,
        job: "pull-test-unit".to_string(),
        refs: Refs {
            org: "example".to_string(),
            repo: "widget".to_string(),
            base_ref: "main".to_string(),
            base_sha: "abcdef0123456789abcdef0123456789abcdef01".to_string(),
            pulls: Vec::new(),
        },
    };
    let ctx = Arc::new(JobContext::new(spec, "stable".to_string()));
    if !namespace.is_empty() {
        ctx.set_namespace(namespace.to_string());
    }
    ctx
}

#[allow(dead_code)]
pub fn link_names(links: &[Link]) -> Vec<String> {
    links.iter().map(|link| link.to_string()).collect()
}

#[allow(dead_code)]
pub fn sample_config() -> pipewright::config::model::BuildConfiguration {
    let mut map = BTreeMap::new();
    map.insert(
        "os".to_string(),
        pipewright::config::model::ImageTagReference {
            namespace: "openshift".to_string(),
            name: "origin-v4.0".to_string(),
            tag: "base".to_string(),
        },
    );
    pipewright::config::model::BuildConfiguration {
        base_images: map,
        binary_build_commands: Some("make build".to_string()),
        images: vec![pipewright::config::model::ImageBuildConfig {
            name: "controller".to_string(),
            from: Some("bin".to_string()),
            dockerfile_path: None,
            context_dir: None,
        }],
        tests: vec![pipewright::config::model::TestStageConfig {
            name: "unit".to_string(),
            from: Some("src".to_string()),
            commands: "make test".to_string(),
            artifact_dir: None,
        }],
        ..Default::default()
    }
}
