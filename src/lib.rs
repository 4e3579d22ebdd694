// src/lib.rs

pub mod cli;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod execute;
pub mod graph;
pub mod junit;
pub mod logging;
pub mod steps;
pub mod workspace;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::cluster::client::ClusterClient;
use crate::cluster::oc::OcClient;
use crate::cluster::workspace::{initialize_workspace, WorkspaceOptions};
use crate::config::job::{JobContext, JobSpec};
use crate::config::loader::load_configuration;
use crate::config::model::TestStageConfig;
use crate::errors::{OperatorError, Result};
use crate::execute::post::run_post_steps;
use crate::execute::scheduler::run_steps;
use crate::graph::build::{build_graph, StepGraph};
use crate::graph::topo::print_execution_order;

/// High-level entry point used by `main.rs`.
///
/// Wires together configuration loading, step construction, graph
/// building, workspace derivation and initialization, execution, and the
/// post-run hooks.
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_configuration(args.config.as_deref(), args.override_config.as_deref())?;
    let job_spec = resolve_job_spec(&args).await?;
    let ctx = Arc::new(JobContext::new(job_spec, args.base_namespace.clone()));
    info!(source = %ctx.source_description(), "resolved source");

    let idle_cleanup = cli::parse_idle_duration(&args.delete_when_idle)
        .map_err(OperatorError::ConfigurationInvalid)?;
    let extra_tests = load_template_stages(&args.templates)?;

    let client: Arc<dyn ClusterClient> = Arc::new(OcClient::new());
    let step_set = steps::from_config(&config, &ctx, &client, &extra_tests, args.promote)?;

    // One cancellation source for the whole run; Ctrl-C trips it.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for interrupt");
                return;
            }
            info!("interrupt received; cancelling run");
            cancel.cancel();
        });
    }

    let graph = build_graph(&step_set.steps, &args.targets)?;

    // Inputs are resolved on the pruned graph, before the workspace is
    // chosen, so jobs with the same dependency closure share artifacts.
    let inputs = workspace::resolve_inputs(&graph, &config, &cancel, args.dry_run).await?;
    let id = workspace::input_hash(&inputs);
    let template = args
        .namespace
        .clone()
        .unwrap_or_else(|| workspace::DEFAULT_WORKSPACE_TEMPLATE.to_string());
    let namespace = workspace::workspace_name(&template, &id);
    ctx.set_namespace(namespace.clone());
    info!(workspace = %namespace, "resolved workspace");

    print_execution_order(&graph)?;

    if !args.dry_run {
        let options = WorkspaceOptions {
            secret_dirs: args.secret_dirs.iter().map(PathBuf::from).collect(),
            idle_cleanup,
        };
        initialize_workspace(&client, &ctx, &options).await?;
    }

    let (report, result) = run_steps(&graph, &cancel, args.dry_run).await;
    if let Some(dir) = &args.artifact_dir {
        if let Err(err) = junit::write_junit(Path::new(dir), "operator", &report) {
            warn!(error = %format!("{err:#}"), "unable to write JUnit results");
        }
    }
    result?;

    run_post_steps(&step_set.post_steps, &cancel, args.dry_run).await?;

    if let Some(path) = &args.write_params {
        write_params(Path::new(path), &ctx, &graph)?;
    }

    Ok(())
}

/// The job descriptor comes from `JOB_SPEC`, with `--git-ref` either
/// replacing the refs subtree or standing in for the whole descriptor.
async fn resolve_job_spec(args: &CliArgs) -> Result<JobSpec> {
    match JobSpec::from_env() {
        Ok(mut spec) => {
            if let Some(git_ref) = &args.git_ref {
                let resolved = JobSpec::from_git_ref(git_ref).await?;
                spec.refs = resolved.refs;
            }
            Ok(spec)
        }
        Err(env_err) => match &args.git_ref {
            Some(git_ref) => JobSpec::from_git_ref(git_ref).await,
            None => Err(env_err),
        },
    }
}

/// Template files are JSON test stage definitions attached to the run.
fn load_template_stages(paths: &[String]) -> Result<Vec<TestStageConfig>> {
    let mut stages = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = fs::read_to_string(path)?;
        let mut stage: TestStageConfig = serde_json::from_str(&contents).map_err(|err| {
            OperatorError::ConfigurationInvalid(format!("unable to parse template {path}: {err}"))
        })?;
        if stage.name.is_empty() {
            stage.name = Path::new(path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        stages.push(stage);
    }
    Ok(stages)
}

/// Write an env-compatible parameter file: the job identity plus every
/// parameter the executed steps provide.
fn write_params(path: &Path, ctx: &JobContext, graph: &StepGraph) -> Result<()> {
    let mut lines = vec![
        format!("NAMESPACE={}", ctx.namespace()),
        format!("JOB_NAME={}", ctx.spec.job),
        format!("JOB_NAME_SAFE={}", ctx.spec.safe_job_name()),
        format!(
            "JOB_NAME_HASH={}",
            workspace::input_hash(&vec![ctx.spec.job.clone()])
        ),
    ];
    for node in graph.nodes() {
        for (key, value) in node.step.provides() {
            lines.push(format!("{key}={value}"));
        }
    }
    fs::write(path, lines.join("\n") + "\n")?;
    info!(path = %path.display(), "wrote job parameters");
    Ok(())
}
