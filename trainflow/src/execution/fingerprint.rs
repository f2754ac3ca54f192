//! Fingerprints of a step's resolved inputs.

use crate::core::{StepKind, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hashes everything that determines a cacheable step's result.
///
/// The step name is not hashed, so an unchanged step keeps its
/// fingerprint across graph rebuilds.
#[must_use]
pub fn step_fingerprint(
    kind: StepKind,
    arguments: &serde_json::Value,
    resolved_inputs: &BTreeMap<String, Value>,
    code_digest: Option<&str>,
) -> String {
    // serde_json maps are ordered, so this rendering is canonical.
    let document = serde_json::json!({
        "kind": kind.to_string(),
        "arguments": arguments,
        "inputs": resolved_inputs
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>(),
        "code": code_digest,
    });

    let mut hasher = Sha256::new();
    hasher.update(document.to_string().as_bytes());
    format!("step:{}", hex::encode(hasher.finalize()))
}
