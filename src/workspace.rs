// src/workspace.rs

//! Workspace identity.
//!
//! Every run lands its side effects in a content-addressed workspace
//! (cluster namespace) whose name is derived from the inputs of the steps
//! that will actually execute plus the serialized configuration. Two runs
//! with the same pruned dependency closure and configuration share a
//! workspace and therefore its cached artifacts.

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::model::BuildConfiguration;
use crate::errors::{OperatorError, Result};
use crate::graph::build::StepGraph;
use crate::graph::step::InputDefinition;

/// Number of digest bytes kept for the workspace name. Workspace names
/// are shared across job restarts, so this constant must not change.
const HASH_BYTES: usize = 5;

/// Case-collision-safe name alphabet: lowercase letters and digits with
/// the vowels removed and `0`/`1` standing in for `o`/`l` lookalikes.
const NAME_ALPHABET: &[u8; 32] = b"bcdfghijklmnpqrstvwxyz0123456789";

/// Default workspace template when the caller supplies none.
pub const DEFAULT_WORKSPACE_TEMPLATE: &str = "ci-op-{id}";

/// Collect the input definition of the graph that will execute.
///
/// Steps are queried in graph-construction order and the canonical
/// configuration serialization is appended last. Must run on the pruned
/// graph: callers rely on two invocations with the same pruned closure
/// sharing a workspace.
pub async fn resolve_inputs(
    graph: &StepGraph,
    config: &BuildConfiguration,
    cancel: &CancellationToken,
    dry: bool,
) -> Result<InputDefinition> {
    let mut inputs = InputDefinition::new();
    for node in graph.nodes() {
        let step_inputs = node
            .step
            .inputs(cancel, dry)
            .await
            .map_err(|err| match err {
                crate::graph::step::StepError::Cancelled => OperatorError::Cancelled,
                other => OperatorError::InputResolution {
                    step: node.step.name().to_string(),
                    source: other.into(),
                },
            })?;
        debug!(step = %node.step.name(), count = step_inputs.len(), "resolved step inputs");
        inputs.extend(step_inputs);
    }

    let serialized = config
        .canonical_json()
        .map_err(|err| OperatorError::ConfigurationInvalid(err.to_string()))?;
    inputs.push(serialized);

    Ok(inputs)
}

/// Hash the input definition into the short workspace identifier.
pub fn input_hash(inputs: &InputDefinition) -> String {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input.as_bytes());
    }
    let digest = hasher.finalize();
    encode_name(&digest[..HASH_BYTES])
}

/// Substitute the derived identifier into the caller's workspace
/// template. A template without `{id}` is used verbatim.
pub fn workspace_name(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

/// Encode bytes into the 32-symbol name alphabet, five bits per symbol,
/// most significant bit first, no padding.
pub fn encode_name(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = (buffer >> bits) & 0x1f;
            encoded.push(NAME_ALPHABET[index as usize] as char);
        }
    }
    if bits > 0 {
        let index = (buffer << (5 - bits)) & 0x1f;
        encoded.push(NAME_ALPHABET[index as usize] as char);
    }

    encoded
}
