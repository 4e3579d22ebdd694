// src/config/job.rs

//! The job descriptor: which repository, commit and pull requests a run is
//! testing, plus the run-scoped workspace handle shared with the steps.

use std::sync::OnceLock;

use anyhow::{anyhow, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::info;

use crate::errors::{OperatorError, Result};

/// Job descriptor loaded from the `JOB_SPEC` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: JobType,

    pub job: String,

    pub refs: Refs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Presubmit,
    Postsubmit,
    Periodic,
    Batch,
}

/// Source references: the base branch plus any pull requests merged on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Refs {
    pub org: String,
    pub repo: String,
    #[serde(default)]
    pub base_ref: String,
    #[serde(default)]
    pub base_sha: String,
    #[serde(default)]
    pub pulls: Vec<Pull>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pull {
    pub number: u64,
    pub author: String,
    pub sha: String,
}

impl JobSpec {
    /// Load the job descriptor from the `JOB_SPEC` environment variable.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var("JOB_SPEC").map_err(|_| {
            OperatorError::ConfigurationInvalid(
                "JOB_SPEC environment variable is not set".to_string(),
            )
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            OperatorError::ConfigurationInvalid(format!("unparseable JOB_SPEC: {err}"))
        })
    }

    /// Build a job descriptor from an `ORG/NAME@REV` shorthand, resolving
    /// the revision to a commit via the remote repository.
    pub async fn from_git_ref(git_ref: &str) -> Result<Self> {
        let refs = resolve_git_ref(git_ref).await?;
        Ok(JobSpec {
            job_type: JobType::Periodic,
            job: "dev".to_string(),
            refs,
        })
    }

    /// The job name in a form safe for use as a cluster resource name.
    pub fn safe_job_name(&self) -> String {
        let mut safe: String = self
            .job
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        safe.truncate(63);
        safe.trim_matches('-').to_string()
    }
}

/// Parse `ORG/NAME@REV` and resolve `REV` against the remote. If the remote
/// does not know the revision it is kept verbatim as the base SHA.
async fn resolve_git_ref(git_ref: &str) -> Result<Refs> {
    let (repo_part, rev) = git_ref
        .split_once('@')
        .ok_or_else(|| OperatorError::ConfigurationInvalid("must be ORG/NAME@REV".to_string()))?;
    let (org, repo) = repo_part
        .split_once('/')
        .ok_or_else(|| OperatorError::ConfigurationInvalid("must be ORG/NAME@REV".to_string()))?;

    let url = format!("https://github.com/{org}/{repo}.git");
    let sha = match ls_remote(&url, rev).await {
        Ok(Some(sha)) => {
            info!(git_ref = %git_ref, commit = %sha, "resolved git ref");
            sha
        }
        Ok(None) => rev.to_string(),
        Err(err) => {
            info!(git_ref = %git_ref, error = %err, "remote resolution failed; using ref verbatim");
            rev.to_string()
        }
    };

    Ok(Refs {
        org: org.to_string(),
        repo: repo.to_string(),
        base_ref: rev.to_string(),
        base_sha: sha,
        pulls: Vec::new(),
    })
}

async fn ls_remote(url: &str, rev: &str) -> anyhow::Result<Option<String>> {
    let output = Command::new("git")
        .arg("ls-remote")
        .arg(url)
        .arg(rev)
        .output()
        .await
        .with_context(|| format!("running git ls-remote for {url}"))?;
    if !output.status.success() {
        return Err(anyhow!("git ls-remote exited with {}", output.status));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let sha = stdout
        .lines()
        .next()
        .and_then(|line| line.split('\t').next())
        .map(str::to_string)
        .filter(|s| !s.is_empty());
    Ok(sha)
}

/// Run-scoped context shared with every step: the job descriptor plus the
/// workspace name, which is only known after input resolution.
#[derive(Debug)]
pub struct JobContext {
    pub spec: JobSpec,
    pub base_namespace: String,
    namespace: OnceLock<String>,
}

impl JobContext {
    pub fn new(spec: JobSpec, base_namespace: String) -> Self {
        Self {
            spec,
            base_namespace,
            namespace: OnceLock::new(),
        }
    }

    /// Record the derived workspace name. Set exactly once, after input
    /// resolution and before any step runs.
    pub fn set_namespace(&self, namespace: String) {
        let _ = self.namespace.set(namespace);
    }

    /// The workspace (namespace) this run executes in. Empty until
    /// [`set_namespace`](Self::set_namespace) has been called.
    pub fn namespace(&self) -> &str {
        self.namespace.get().map(String::as_str).unwrap_or("")
    }

    /// One-line description of the source under test, for logging and the
    /// workspace description.
    pub fn source_description(&self) -> String {
        let refs = &self.spec.refs;
        if refs.pulls.is_empty() {
            format!(
                "https://github.com/{}/{} at {}@{}",
                refs.org,
                refs.repo,
                refs.base_ref,
                shorten(&refs.base_sha, 8)
            )
        } else {
            let pulls: Vec<String> = refs
                .pulls
                .iter()
                .map(|pull| format!("#{} {} @{}", pull.number, shorten(&pull.sha, 8), pull.author))
                .collect();
            format!(
                "https://github.com/{}/{} at {}@{}, merging: {}",
                refs.org,
                refs.repo,
                refs.base_ref,
                shorten(&refs.base_sha, 8),
                pulls.join(", ")
            )
        }
    }
}

fn sha_regex() -> &'static Regex {
    static SHA_REGEX: OnceLock<Regex> = OnceLock::new();
    SHA_REGEX.get_or_init(|| Regex::new(r"^[0-9a-fA-F]+$").expect("static pattern compiles"))
}

/// Truncate a value to `len` characters if it looks like a hexadecimal git
/// SHA; refs and tags are passed through untouched.
pub fn shorten(value: &str, len: usize) -> &str {
    if value.len() > len && sha_regex().is_match(value) {
        &value[..len]
    } else {
        value
    }
}
