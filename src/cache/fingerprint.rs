// src/cache/fingerprint.rs

use std::collections::BTreeMap;
use std::fmt;

use blake3::Hasher;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::errors::Result;
use crate::ir::{
    ArtifactTypeSchema, ExecutorInput, PipelineContainerSpec, PipelineTaskSpec, PrimitiveType,
    Value,
};
use crate::resolve::placeholder::expand_for_fingerprint;

/// Identifies one cacheable execution: pipeline context, task and the
/// fingerprint of its effective inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub context: String,
    pub task: String,
    pub fingerprint: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.context, self.task, self.fingerprint)
    }
}

/// Serialize JSON with object keys sorted and no insignificant whitespace.
pub fn to_canonical_json(value: &Json) -> String {
    match value {
        Json::Null => "null".to_string(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        // `Display` for a JSON string is its quoted, escaped form.
        Json::String(_) => value.to_string(),
        Json::Array(items) => {
            let items: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Json::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, to_canonical_json(v))).collect();
            let items: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Json::String(k.clone()), v))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

/// blake3 of `input`, hex encoded.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

#[derive(Serialize)]
struct ArtifactIdentity<'a> {
    uri: &'a str,
    #[serde(rename = "type")]
    artifact_type: &'a ArtifactTypeSchema,
    properties: &'a BTreeMap<String, Value>,
    custom_properties: &'a BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct OutputArtifactSignature<'a> {
    #[serde(rename = "type")]
    artifact_type: &'a ArtifactTypeSchema,
    properties: &'a BTreeMap<String, Value>,
    custom_properties: &'a BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    executor_label: &'a str,
    image: &'a str,
    command: Vec<String>,
    args: Vec<String>,
    parameters: &'a BTreeMap<String, Value>,
    artifacts: BTreeMap<&'a str, Vec<ArtifactIdentity<'a>>>,
    output_parameters: BTreeMap<&'a str, PrimitiveType>,
    output_artifacts: BTreeMap<&'a str, Vec<OutputArtifactSignature<'a>>>,
}

/// Fingerprint of a container task's effective inputs.
///
/// Covers the executor image, the command line with input placeholders
/// expanded, input parameter values, input artifact identities and the
/// declared output signature. Output locations allocated for this run are
/// not part of it, so identical work in a later run yields the same value.
pub fn compute_fingerprint(
    task: &PipelineTaskSpec,
    container: &PipelineContainerSpec,
    input: &ExecutorInput,
) -> Result<String> {
    let command = expand_for_fingerprint(&container.command, input, &task.name)?;
    let args = expand_for_fingerprint(&container.args, input, &task.name)?;

    let artifacts = input
        .inputs
        .artifacts
        .iter()
        .map(|(key, list)| {
            let ids = list
                .artifacts
                .iter()
                .map(|a| ArtifactIdentity {
                    uri: &a.uri,
                    artifact_type: &a.artifact_type,
                    properties: &a.properties,
                    custom_properties: &a.custom_properties,
                })
                .collect();
            (key.as_str(), ids)
        })
        .collect();

    let output_parameters = task
        .outputs
        .parameters
        .iter()
        .map(|(key, spec)| (key.as_str(), spec.parameter_type))
        .collect();

    let output_artifacts = input
        .outputs
        .artifacts
        .iter()
        .map(|(key, list)| {
            let sigs = list
                .artifacts
                .iter()
                .map(|a| OutputArtifactSignature {
                    artifact_type: &a.artifact_type,
                    properties: &a.properties,
                    custom_properties: &a.custom_properties,
                })
                .collect();
            (key.as_str(), sigs)
        })
        .collect();

    let fp_input = FingerprintInput {
        executor_label: &task.executor_label,
        image: &container.image,
        command,
        args,
        parameters: &input.inputs.parameters,
        artifacts,
        output_parameters,
        output_artifacts,
    };

    let json = serde_json::to_value(&fp_input)?;
    let fingerprint = hash_str(&to_canonical_json(&json));
    debug!(task = %task.name, fingerprint = %fingerprint, "computed task fingerprint");
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let val = json!({ "z": [ { "y": "yes" }, null ], "a": { "x": 10 } });
        assert_eq!(
            to_canonical_json(&val),
            "{\"a\":{\"x\":10},\"z\":[{\"y\":\"yes\"},null]}"
        );
    }

    #[test]
    fn canonical_json_escapes_strings() {
        assert_eq!(to_canonical_json(&json!("a\"b")), "\"a\\\"b\"");
        assert_eq!(to_canonical_json(&json!({"k\n": 1})), "{\"k\\n\":1}");
    }

    #[test]
    fn hash_is_hex_blake3() {
        let h = hash_str("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_str("hello"));
        assert_ne!(h, hash_str("hello "));
    }

    #[test]
    fn cache_key_display() {
        let key = CacheKey {
            context: "pipe".into(),
            task: "train".into(),
            fingerprint: "abc".into(),
        };
        assert_eq!(key.to_string(), "pipe/train/abc");
    }
}
