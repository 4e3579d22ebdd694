// src/graph/topo.rs

//! Deterministic topological linearization for logging and diagnostics.
//!
//! The scheduler is only partially ordered; this module produces one
//! stable linearization per graph so successive runs log identical
//! execution plans. It also double-checks the builder's invariants: a
//! node whose requirements can never be satisfied is reported with its
//! missing links.

use std::collections::BTreeSet;

use tracing::{error, info};

use crate::errors::{OperatorError, Result};
use crate::graph::build::StepGraph;
use crate::graph::link::{has_all_links, Link};

/// Produce a topological order of node indices.
///
/// Each pass selects every unseen node whose in-graph requirements are
/// already satisfied and emits them in step-name order. Requirements no
/// step in the graph creates are treated as satisfied from the start;
/// the builder has already vetted them as external inputs.
pub fn topological_order(graph: &StepGraph) -> Result<Vec<usize>> {
    let created_in_graph: Vec<Link> = graph
        .nodes()
        .iter()
        .flat_map(|node| node.step.creates())
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(graph.len());
    let mut satisfied: Vec<Link> = Vec::new();
    let mut seen: BTreeSet<usize> = BTreeSet::new();

    while seen.len() < graph.len() {
        let mut ready: Vec<usize> = (0..graph.len())
            .filter(|index| !seen.contains(index))
            .filter(|&index| {
                let required = in_graph_requires(graph, index, &created_in_graph);
                has_all_links(&required, &satisfied)
            })
            .collect();

        if ready.is_empty() {
            report_stuck(graph, &seen, &satisfied, &created_in_graph);
            return Err(OperatorError::UnsatisfiedDependency(
                "steps are missing dependencies".to_string(),
            ));
        }

        ready.sort_by(|&a, &b| {
            graph.nodes()[a]
                .step
                .name()
                .cmp(graph.nodes()[b].step.name())
        });

        for index in ready {
            satisfied.extend(graph.nodes()[index].step.creates());
            seen.insert(index);
            order.push(index);
        }
    }

    Ok(order)
}

/// Log the execution plan once, before the scheduler starts.
pub fn print_execution_order(graph: &StepGraph) -> Result<()> {
    let order = topological_order(graph)?;
    let names: Vec<&str> = order
        .iter()
        .map(|&index| graph.nodes()[index].step.name())
        .collect();
    info!("running steps: {}", names.join(", "));
    Ok(())
}

fn in_graph_requires(graph: &StepGraph, index: usize, created_in_graph: &[Link]) -> Vec<Link> {
    graph.nodes()[index]
        .step
        .requires()
        .into_iter()
        .filter(|link| created_in_graph.contains(link))
        .collect()
}

fn report_stuck(
    graph: &StepGraph,
    seen: &BTreeSet<usize>,
    satisfied: &[Link],
    created_in_graph: &[Link],
) {
    for index in 0..graph.len() {
        if seen.contains(&index) {
            continue;
        }
        let missing: Vec<String> = in_graph_requires(graph, index, created_in_graph)
            .into_iter()
            .filter(|link| !has_all_links(std::slice::from_ref(link), satisfied))
            .map(|link| link.to_string())
            .collect();
        error!(
            step = %graph.nodes()[index].step.name(),
            "step is missing dependencies: {}",
            missing.join(", ")
        );
    }
}
