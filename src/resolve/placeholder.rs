// src/resolve/placeholder.rs

//! `{{$...}}` template expansion.
//!
//! Supported placeholders:
//!
//! | Placeholder                                      | Expands to                              |
//! |--------------------------------------------------|-----------------------------------------|
//! | `{{$}}`                                          | the whole `ExecutorInput` as JSON       |
//! | `{{$.inputs.parameters['k']}}`                   | scalar value of input parameter `k`     |
//! | `{{$.inputs.artifacts['k'].uri}}`                | URI of the first artifact of input `k`  |
//! | `{{$.inputs.artifacts['k'].properties['p']}}`    | property `p` of that artifact           |
//! | `{{$.outputs.parameters['k'].output_file}}`      | file the executor writes parameter `k`  |
//! | `{{$.outputs.artifacts['k'].uri}}`               | allocated URI of output artifact `k`    |
//! | `{{$.outputs.artifacts['k'].properties['p']}}`   | property `p` of that output artifact    |
//! | `{{$.outputs.output_file}}`                      | path of the `ExecutorOutput` JSON file  |
//!
//! Text outside `{{$ ... }}` is copied verbatim. Anything inside that does
//! not match the grammar, or names an unknown key, is an error.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{EngineError, Result};
use crate::ir::{ArtifactList, ExecutorInput, RuntimeArtifact};

const OPEN: &str = "{{$";
const CLOSE: &str = "}}";

static PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\$(?:\.(?P<dir>inputs|outputs)\.(?P<kind>parameters|artifacts)\['(?P<key>[^'\]]+)'\](?P<field>\.uri|\.output_file|\.properties\['(?P<prop>[^'\]]+)'\])?|\.outputs\.(?P<of>output_file))?$",
    )
    .expect("placeholder grammar is a valid regex")
});

/// A parsed placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    ExecutorInput,
    InputParameter(String),
    InputArtifactUri(String),
    InputArtifactProperty { key: String, property: String },
    OutputParameterFile(String),
    OutputArtifactUri(String),
    OutputArtifactProperty { key: String, property: String },
    OutputFile,
}

impl Placeholder {
    /// Parse the text between `{{` and `}}`, e.g. `$.inputs.parameters['x']`.
    pub fn parse(path: &str) -> Option<Placeholder> {
        let caps = PATH.captures(path.trim())?;

        if caps.name("of").is_some() {
            return Some(Placeholder::OutputFile);
        }
        let (Some(dir), Some(kind), Some(key)) = (caps.name("dir"), caps.name("kind"), caps.name("key"))
        else {
            return Some(Placeholder::ExecutorInput);
        };
        let key = key.as_str().to_string();
        let field = caps.name("field").map(|m| m.as_str());
        let prop = caps.name("prop").map(|m| m.as_str().to_string());

        match (dir.as_str(), kind.as_str(), field, prop) {
            ("inputs", "parameters", None, _) => Some(Placeholder::InputParameter(key)),
            ("inputs", "artifacts", Some(".uri"), _) => Some(Placeholder::InputArtifactUri(key)),
            ("inputs", "artifacts", Some(_), Some(property)) => {
                Some(Placeholder::InputArtifactProperty { key, property })
            }
            ("outputs", "parameters", Some(".output_file"), _) => {
                Some(Placeholder::OutputParameterFile(key))
            }
            ("outputs", "artifacts", Some(".uri"), _) => Some(Placeholder::OutputArtifactUri(key)),
            ("outputs", "artifacts", Some(_), Some(property)) => {
                Some(Placeholder::OutputArtifactProperty { key, property })
            }
            _ => None,
        }
    }

    /// Whether the expansion depends on run-specific output locations
    /// (and thus must not feed a cache fingerprint).
    pub fn is_run_specific(&self) -> bool {
        matches!(
            self,
            Placeholder::ExecutorInput
                | Placeholder::OutputParameterFile(_)
                | Placeholder::OutputArtifactUri(_)
                | Placeholder::OutputArtifactProperty { .. }
                | Placeholder::OutputFile
        )
    }

    fn render(&self, input: &ExecutorInput) -> std::result::Result<String, String> {
        match self {
            Placeholder::ExecutorInput => {
                serde_json::to_string(input).map_err(|e| format!("serializing executor input: {e}"))
            }
            Placeholder::InputParameter(key) => input
                .inputs
                .parameters
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| format!("unknown input parameter '{key}'")),
            Placeholder::InputArtifactUri(key) => {
                first_artifact(&input.inputs.artifacts, key, "input").map(|a| a.uri.clone())
            }
            Placeholder::InputArtifactProperty { key, property } => {
                let artifact = first_artifact(&input.inputs.artifacts, key, "input")?;
                property_of(artifact, property)
            }
            Placeholder::OutputParameterFile(key) => input
                .outputs
                .parameters
                .get(key)
                .map(|p| p.output_file.clone())
                .ok_or_else(|| format!("unknown output parameter '{key}'")),
            Placeholder::OutputArtifactUri(key) => {
                first_artifact(&input.outputs.artifacts, key, "output").map(|a| a.uri.clone())
            }
            Placeholder::OutputArtifactProperty { key, property } => {
                let artifact = first_artifact(&input.outputs.artifacts, key, "output")?;
                property_of(artifact, property)
            }
            Placeholder::OutputFile => Ok(input.outputs.output_file.clone()),
        }
    }
}

fn first_artifact<'a>(
    lists: &'a std::collections::BTreeMap<String, ArtifactList>,
    key: &str,
    side: &str,
) -> std::result::Result<&'a RuntimeArtifact, String> {
    let list = lists
        .get(key)
        .ok_or_else(|| format!("unknown {side} artifact '{key}'"))?;
    list.first()
        .ok_or_else(|| format!("{side} artifact '{key}' has no artifacts"))
}

fn property_of(artifact: &RuntimeArtifact, property: &str) -> std::result::Result<String, String> {
    artifact
        .properties
        .get(property)
        .map(|v| v.to_string())
        .ok_or_else(|| format!("artifact '{}' has no property '{property}'", artifact.name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Invocation,
    /// Run-specific placeholders are validated but left verbatim.
    Fingerprint,
}

/// Expand every placeholder in `template`.
pub fn expand(template: &str, input: &ExecutorInput, task: &str) -> Result<String> {
    expand_with(template, input, task, Mode::Invocation)
}

pub fn expand_all(templates: &[String], input: &ExecutorInput, task: &str) -> Result<Vec<String>> {
    templates
        .iter()
        .map(|t| expand_with(t, input, task, Mode::Invocation))
        .collect()
}

/// Expansion used for cache fingerprints: input placeholders are expanded,
/// output-location placeholders and `{{$}}` are kept as written so the
/// result does not depend on which run allocated the outputs.
pub fn expand_for_fingerprint(
    templates: &[String],
    input: &ExecutorInput,
    task: &str,
) -> Result<Vec<String>> {
    templates
        .iter()
        .map(|t| expand_with(t, input, task, Mode::Fingerprint))
        .collect()
}

fn expand_with(template: &str, input: &ExecutorInput, task: &str, mode: Mode) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(EngineError::PlaceholderResolution {
                task: task.to_string(),
                placeholder: rest[start..].to_string(),
                reason: "unterminated placeholder".to_string(),
            });
        };
        let token = &rest[start..start + 2 + end + CLOSE.len()];
        let path = &after_open[..end];

        let placeholder =
            Placeholder::parse(path).ok_or_else(|| EngineError::PlaceholderResolution {
                task: task.to_string(),
                placeholder: token.to_string(),
                reason: "does not match the placeholder grammar".to_string(),
            })?;

        let rendered = placeholder
            .render(input)
            .map_err(|reason| EngineError::PlaceholderResolution {
                task: task.to_string(),
                placeholder: token.to_string(),
                reason,
            })?;

        if mode == Mode::Fingerprint && placeholder.is_run_specific() {
            out.push_str(token);
        } else {
            out.push_str(&rendered);
        }

        rest = &rest[start + 2 + end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArtifactTypeSchema, OutputParameter, Value};

    fn input() -> ExecutorInput {
        let mut input = ExecutorInput::default();
        input
            .inputs
            .parameters
            .insert("x".to_string(), Value::from("hello"));
        input.inputs.parameters.insert("n".to_string(), Value::Int(3));
        let mut data = RuntimeArtifact::new(
            "A.data",
            ArtifactTypeSchema::SchemaTitle("system.Dataset".into()),
            "gs://bucket/a/data",
        );
        data.properties.insert("rows".to_string(), Value::Int(10));
        input
            .inputs
            .artifacts
            .insert("data".to_string(), ArtifactList::from(vec![data]));
        input.outputs.parameters.insert(
            "count".to_string(),
            OutputParameter {
                output_file: "/tmp/run/B/parameters/count".to_string(),
            },
        );
        input.outputs.output_file = "/tmp/run/B/executor_output.json".to_string();
        input
    }

    #[test]
    fn expands_input_parameter_to_bare_scalar() {
        let out = expand("{{$.inputs.parameters['x']}}", &input(), "B").unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn expands_inside_surrounding_text() {
        let out = expand("--n={{$.inputs.parameters['n']}}!", &input(), "B").unwrap();
        assert_eq!(out, "--n=3!");
    }

    #[test]
    fn expands_artifact_uri_and_property() {
        let i = input();
        assert_eq!(
            expand("{{$.inputs.artifacts['data'].uri}}", &i, "B").unwrap(),
            "gs://bucket/a/data"
        );
        assert_eq!(
            expand("{{$.inputs.artifacts['data'].properties['rows']}}", &i, "B").unwrap(),
            "10"
        );
    }

    #[test]
    fn expands_output_locations() {
        let i = input();
        assert_eq!(
            expand("{{$.outputs.parameters['count'].output_file}}", &i, "B").unwrap(),
            "/tmp/run/B/parameters/count"
        );
        assert_eq!(
            expand("{{$.outputs.output_file}}", &i, "B").unwrap(),
            "/tmp/run/B/executor_output.json"
        );
    }

    #[test]
    fn whole_input_is_json() {
        let i = input();
        let out = expand("{{$}}", &i, "B").unwrap();
        let back: ExecutorInput = serde_json::from_str(&out).unwrap();
        assert_eq!(back, i);
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = expand("{{$.inputs.parameters['missing']}}", &input(), "B").unwrap_err();
        match err {
            EngineError::PlaceholderResolution { task, placeholder, .. } => {
                assert_eq!(task, "B");
                assert_eq!(placeholder, "{{$.inputs.parameters['missing']}}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_placeholders_are_errors() {
        for bad in [
            "{{$.inputs.parameters[x]}}",
            "{{$.inputs.params['x']}}",
            "{{$.inputs.parameters['x']",
            "{{$.outputs.parameters['count']}}",
        ] {
            assert!(
                matches!(
                    expand(bad, &input(), "B"),
                    Err(EngineError::PlaceholderResolution { .. })
                ),
                "{bad} should fail"
            );
        }
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        assert_eq!(expand("echo {{ not one }}", &input(), "B").unwrap(), "echo {{ not one }}");
    }

    #[test]
    fn fingerprint_mode_keeps_output_locations_verbatim() {
        let templates = vec![
            "{{$.inputs.parameters['n']}}".to_string(),
            "{{$.outputs.parameters['count'].output_file}}".to_string(),
        ];
        let out = expand_for_fingerprint(&templates, &input(), "B").unwrap();
        assert_eq!(out[0], "3");
        assert_eq!(out[1], "{{$.outputs.parameters['count'].output_file}}");
    }
}
