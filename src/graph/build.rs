// src/graph/build.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{OperatorError, Result};
use crate::graph::link::Link;
use crate::graph::step::Step;

/// A step plus its resolved edges within the graph, by node index.
///
/// `children` are the nodes that depend on this one; `parents` are the
/// nodes it depends on. Both are ordered by step name for reproducible
/// diagnostics.
pub struct StepNode {
    pub step: Arc<dyn Step>,
    pub children: Vec<usize>,
    pub parents: Vec<usize>,
}

impl std::fmt::Debug for StepNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepNode")
            .field("step", &self.step.name())
            .field("children", &self.children)
            .field("parents", &self.parents)
            .finish()
    }
}

/// The DAG of steps, pruned to the caller's targets.
///
/// Nodes keep the order in which their steps were constructed from the
/// configuration; the input resolver relies on this.
pub struct StepGraph {
    nodes: Vec<StepNode>,
    roots: Vec<usize>,
}

impl std::fmt::Debug for StepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepGraph")
            .field("nodes", &self.nodes)
            .field("roots", &self.roots)
            .finish()
    }
}

impl StepGraph {
    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    /// Indices of nodes no step in the graph depends on upward.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.step.name())
    }
}

/// Wire the world of constructed steps into a DAG and prune it to the
/// ancestor closure of `targets` (empty targets keep everything).
pub fn build_graph(world: &[Arc<dyn Step>], targets: &[String]) -> Result<StepGraph> {
    // Every link has at most one creator.
    let mut creators: HashMap<Link, usize> = HashMap::new();
    for (index, step) in world.iter().enumerate() {
        for link in step.creates() {
            if let Some(&existing) = creators.get(&link) {
                return Err(OperatorError::ConfigurationConflict(format!(
                    "steps '{}' and '{}' both create {}",
                    world[existing].name(),
                    step.name(),
                    link
                )));
            }
            creators.insert(link, index);
        }
    }

    // Wire edges by matching requires against creates.
    let mut children: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); world.len()];
    let mut parents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); world.len()];
    for (index, step) in world.iter().enumerate() {
        for link in step.requires() {
            match creators.get(&link) {
                Some(&creator) if creator == index => {
                    return Err(OperatorError::UnsatisfiedDependency(format!(
                        "step '{}' requires {} which it creates itself",
                        step.name(),
                        link
                    )));
                }
                Some(&creator) => {
                    children[creator].insert(index);
                    parents[index].insert(creator);
                }
                None if link.resolves_externally() => {
                    debug!(step = %step.name(), link = %link, "requirement resolved externally");
                }
                None => {
                    return Err(OperatorError::UnsatisfiedDependency(format!(
                        "step '{}' requires {} but no step creates it",
                        step.name(),
                        link
                    )));
                }
            }
        }
    }

    ensure_acyclic(world, &children)?;

    let kept = match targets.is_empty() {
        true => (0..world.len()).collect::<BTreeSet<usize>>(),
        false => ancestor_closure(world, &parents, targets)?,
    };

    // Re-index the kept subset, preserving construction order.
    let mut index_of: HashMap<usize, usize> = HashMap::new();
    for (new_index, &old_index) in kept.iter().enumerate() {
        index_of.insert(old_index, new_index);
    }

    let mut nodes: Vec<StepNode> = Vec::with_capacity(kept.len());
    for &old_index in &kept {
        let remap = |set: &BTreeSet<usize>| -> Vec<usize> {
            set.iter()
                .filter_map(|old| index_of.get(old).copied())
                .collect()
        };
        nodes.push(StepNode {
            step: world[old_index].clone(),
            children: remap(&children[old_index]),
            parents: remap(&parents[old_index]),
        });
    }

    // Deterministic edge order: by step name, then index.
    let names: Vec<String> = nodes
        .iter()
        .map(|node| node.step.name().to_string())
        .collect();
    for node in &mut nodes {
        node.children
            .sort_by(|&a, &b| names[a].cmp(&names[b]).then(a.cmp(&b)));
        node.parents
            .sort_by(|&a, &b| names[a].cmp(&names[b]).then(a.cmp(&b)));
    }

    let roots = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.parents.is_empty())
        .map(|(index, _)| index)
        .collect();

    Ok(StepGraph { nodes, roots })
}

/// Reject dependency cycles before execution; a cycle can only come from
/// a configuration whose image `from` references loop.
fn ensure_acyclic(world: &[Arc<dyn Step>], children: &[BTreeSet<usize>]) -> Result<()> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for index in 0..world.len() {
        graph.add_node(index);
    }
    for (index, child_set) in children.iter().enumerate() {
        for &child in child_set {
            graph.add_edge(index, child, ());
        }
    }
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(OperatorError::UnsatisfiedDependency(format!(
            "dependency cycle involving step '{}'",
            world[cycle.node_id()].name()
        ))),
    }
}

/// The transitive ancestor closure of the named targets, as world indices.
fn ancestor_closure(
    world: &[Arc<dyn Step>],
    parents: &[BTreeSet<usize>],
    targets: &[String],
) -> Result<BTreeSet<usize>> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (index, step) in world.iter().enumerate() {
        by_name.insert(step.name(), index);
    }

    let mut kept = BTreeSet::new();
    let mut stack = Vec::new();
    for target in targets {
        let &index = by_name.get(target.as_str()).ok_or_else(|| {
            OperatorError::UnknownTarget(format!("no step named '{target}' exists"))
        })?;
        stack.push(index);
    }

    while let Some(index) = stack.pop() {
        if !kept.insert(index) {
            continue;
        }
        stack.extend(parents[index].iter().copied());
    }

    Ok(kept)
}
