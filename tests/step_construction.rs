mod common;

use common::{job_context, FakeCluster};

use pipewright::cluster::client::ClusterClient;
use pipewright::graph::build::build_graph;
use pipewright::graph::topo::topological_order;
use pipewright::steps::from_config;

#[test]
fn sample_config_yields_the_expected_world() {
    let config = common::sample_config();
    let ctx = job_context("ci-op-test");
    let client: std::sync::Arc<dyn ClusterClient> = FakeCluster::new();

    let step_set = from_config(&config, &ctx, &client, &[], false).expect("steps build");
    let names: Vec<&str> = step_set.steps.iter().map(|step| step.name()).collect();
    assert_eq!(names, vec!["src", "os", "bin", "controller", "images", "unit"]);
    assert!(step_set.post_steps.is_empty());
}

#[test]
fn promotion_is_a_post_step() {
    let config = common::sample_config();
    let ctx = job_context("ci-op-test");
    let client: std::sync::Arc<dyn ClusterClient> = FakeCluster::new();

    let step_set = from_config(&config, &ctx, &client, &[], true).expect("steps build");
    let post_names: Vec<&str> = step_set.post_steps.iter().map(|step| step.name()).collect();
    assert_eq!(post_names, vec!["promotion"]);
}

#[test]
fn targeting_a_test_prunes_image_builds() {
    let config = common::sample_config();
    let ctx = job_context("ci-op-test");
    let client: std::sync::Arc<dyn ClusterClient> = FakeCluster::new();

    let step_set = from_config(&config, &ctx, &client, &[], false).expect("steps build");
    let graph = build_graph(&step_set.steps, &["unit".to_string()]).expect("graph builds");

    let mut names: Vec<&str> = graph.step_names().collect();
    names.sort();
    // `unit` runs on `src`; nothing else is needed.
    assert_eq!(names, vec!["src", "unit"]);
}

#[test]
fn targeting_images_pulls_in_the_build_chain() {
    let config = common::sample_config();
    let ctx = job_context("ci-op-test");
    let client: std::sync::Arc<dyn ClusterClient> = FakeCluster::new();

    let step_set = from_config(&config, &ctx, &client, &[], false).expect("steps build");
    let graph = build_graph(&step_set.steps, &["images".to_string()]).expect("graph builds");

    let mut names: Vec<&str> = graph.step_names().collect();
    names.sort();
    // controller builds from bin, which builds from src; the unused base
    // image and the test stage are pruned away.
    assert_eq!(names, vec!["bin", "controller", "images", "src"]);

    let order = topological_order(&graph).expect("order exists");
    let ordered: Vec<&str> = order
        .iter()
        .map(|&index| graph.nodes()[index].step.name())
        .collect();
    assert_eq!(ordered, vec!["src", "bin", "controller", "images"]);
}

#[test]
fn extra_template_stages_become_steps() {
    let config = common::sample_config();
    let ctx = job_context("ci-op-test");
    let client: std::sync::Arc<dyn ClusterClient> = FakeCluster::new();

    let extra = vec![pipewright::config::model::TestStageConfig {
        name: "e2e".to_string(),
        from: Some("controller".to_string()),
        commands: "run-e2e".to_string(),
        artifact_dir: None,
    }];
    let step_set = from_config(&config, &ctx, &client, &extra, false).expect("steps build");
    assert!(step_set.steps.iter().any(|step| step.name() == "e2e"));

    let graph = build_graph(&step_set.steps, &["e2e".to_string()]).expect("graph builds");
    let mut names: Vec<&str> = graph.step_names().collect();
    names.sort();
    assert_eq!(names, vec!["bin", "controller", "e2e", "src"]);
}

#[tokio::test]
async fn base_images_default_to_the_base_namespace() {
    let mut config = common::sample_config();
    config.base_images.get_mut("os").unwrap().namespace = String::new();

    let ctx = job_context("ci-op-test");
    let cluster = FakeCluster::new();
    let client: std::sync::Arc<dyn ClusterClient> = cluster.clone();

    let step_set = from_config(&config, &ctx, &client, &[], false).expect("steps build");
    let os_step = step_set
        .steps
        .iter()
        .find(|step| step.name() == "os")
        .expect("input image step exists");

    let cancel = tokio_util::sync::CancellationToken::new();
    os_step.inputs(&cancel, false).await.expect("inputs resolve");

    let operations = cluster.operations.lock().unwrap().clone();
    // The job context was built with base namespace `stable`.
    assert!(operations
        .iter()
        .any(|op| op == "resolve_image_tag stable/origin-v4.0:base"));
}

#[test]
fn colliding_step_names_are_rejected() {
    let mut config = common::sample_config();
    config.tests.push(pipewright::config::model::TestStageConfig {
        name: "controller".to_string(),
        from: None,
        commands: "echo".to_string(),
        artifact_dir: None,
    });
    let ctx = job_context("ci-op-test");
    let client: std::sync::Arc<dyn ClusterClient> = FakeCluster::new();

    let err = from_config(&config, &ctx, &client, &[], false).expect_err("collision must fail");
    assert!(matches!(
        err,
        pipewright::errors::OperatorError::ConfigurationInvalid(_)
    ));
}
