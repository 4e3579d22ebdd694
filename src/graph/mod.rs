// src/graph/mod.rs

//! The step graph engine.
//!
//! - [`link`] defines the artifact links steps produce and consume.
//! - [`step`] defines the step contract the engine schedules against.
//! - [`build`] wires concrete steps into a DAG and prunes it to targets.
//! - [`topo`] produces the deterministic linearization logged before a run.

pub mod build;
pub mod link;
pub mod step;
pub mod topo;

pub use build::{build_graph, StepGraph, StepNode};
pub use link::{has_all_links, Link};
pub use step::{InputDefinition, Step, StepError};
pub use topo::{print_execution_order, topological_order};
