// src/outputs/ingest.rs

//! Turns what a finished task left behind into [`TaskOutputs`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::ir::{
    ExecutorInput, ExecutorOutput, ImporterSpec, PipelineSpec, PipelineTaskSpec, RuntimeArtifact,
    Value,
};
use crate::metadata::{ArtifactState, MetadataStore};
use crate::resolve::{ArtifactFilter, FilterField, FilterLiteral, RunContext, resolve_value};

use super::TaskOutputs;

fn parsing_error(task: &str, key: &str, reason: impl Into<String>) -> EngineError {
    EngineError::OutputParsing {
        task: task.to_string(),
        output_key: key.to_string(),
        reason: reason.into(),
    }
}

/// Collect the outputs of a finished container task.
///
/// When the task wrote an executor output document, that document is
/// authoritative for parameters and may update the allocated output
/// artifacts. Otherwise every declared output parameter is read from the
/// file allocated for it and artifacts are the allocated skeletons.
pub fn ingest_container_outputs(
    fs: &dyn FileSystem,
    task: &PipelineTaskSpec,
    input: &ExecutorInput,
) -> Result<TaskOutputs> {
    let output_file = Path::new(&input.outputs.output_file);
    let executor_output = if !input.outputs.output_file.is_empty() && fs.is_file(output_file) {
        let contents = fs.read_to_string(output_file)?;
        let parsed: ExecutorOutput = serde_json::from_str(&contents).map_err(|e| {
            parsing_error(
                &task.name,
                &input.outputs.output_file,
                format!("malformed executor output: {e}"),
            )
        })?;
        debug!(task = %task.name, path = ?output_file, "using executor output document");
        Some(parsed)
    } else {
        None
    };

    let parameters = match &executor_output {
        Some(doc) => parameters_from_document(task, doc)?,
        None => parameters_from_files(fs, task, input)?,
    };

    let skeleton: BTreeMap<String, Vec<RuntimeArtifact>> = input
        .outputs
        .artifacts
        .iter()
        .map(|(k, list)| (k.clone(), list.artifacts.clone()))
        .collect();
    let artifacts = match &executor_output {
        Some(doc) => merge_artifacts(&task.name, skeleton, doc)?,
        None => skeleton,
    };

    info!(
        task = %task.name,
        parameters = parameters.len(),
        artifacts = artifacts.len(),
        "ingested task outputs"
    );

    Ok(TaskOutputs {
        parameters,
        artifacts: artifacts
            .into_iter()
            .map(|(k, list)| (k, list.into_iter().map(Arc::new).collect()))
            .collect(),
    })
}

fn parameters_from_document(
    task: &PipelineTaskSpec,
    doc: &ExecutorOutput,
) -> Result<BTreeMap<String, Value>> {
    if let Some(extra) = doc
        .parameters
        .keys()
        .find(|k| !task.outputs.parameters.contains_key(*k))
    {
        return Err(parsing_error(
            &task.name,
            extra,
            "executor output contains an undeclared output parameter",
        ));
    }

    let mut parameters = BTreeMap::new();
    for (key, decl) in &task.outputs.parameters {
        let raw = doc.parameters.get(key).ok_or_else(|| {
            parsing_error(&task.name, key, "declared output parameter missing from executor output")
        })?;
        let value = raw.coerce_to(decl.parameter_type).ok_or_else(|| {
            parsing_error(
                &task.name,
                key,
                format!(
                    "expected {}, executor output has {}",
                    decl.parameter_type,
                    raw.primitive_type()
                ),
            )
        })?;
        parameters.insert(key.clone(), value);
    }
    Ok(parameters)
}

fn parameters_from_files(
    fs: &dyn FileSystem,
    task: &PipelineTaskSpec,
    input: &ExecutorInput,
) -> Result<BTreeMap<String, Value>> {
    let mut parameters = BTreeMap::new();
    for (key, decl) in &task.outputs.parameters {
        let location = input.outputs.parameters.get(key).ok_or_else(|| {
            parsing_error(&task.name, key, "no output file was allocated for this parameter")
        })?;
        let path = Path::new(&location.output_file);
        if !fs.is_file(path) {
            return Err(parsing_error(
                &task.name,
                key,
                format!("output file {:?} was not written", path),
            ));
        }
        let text = fs.read_to_string(path)?;
        let value = Value::parse_as(&text, decl.parameter_type)
            .map_err(|reason| parsing_error(&task.name, key, reason))?;
        parameters.insert(key.clone(), value);
    }
    Ok(parameters)
}

/// Apply executor-reported artifacts onto the allocated skeletons.
///
/// Reported keys must be allocated ones, a reported key replaces its whole
/// list, and no artifact may change type.
fn merge_artifacts(
    task: &str,
    mut skeleton: BTreeMap<String, Vec<RuntimeArtifact>>,
    doc: &ExecutorOutput,
) -> Result<BTreeMap<String, Vec<RuntimeArtifact>>> {
    for (key, updated) in &doc.artifacts {
        let original = skeleton.get_mut(key).ok_or_else(|| {
            parsing_error(task, key, "executor output contains an undeclared output artifact")
        })?;
        if original.len() != updated.artifacts.len() {
            return Err(parsing_error(
                task,
                key,
                format!(
                    "partial update of an output artifact list is not supported ({} allocated, {} reported)",
                    original.len(),
                    updated.artifacts.len()
                ),
            ));
        }
        for (slot, new) in original.iter_mut().zip(&updated.artifacts) {
            if slot.artifact_type != new.artifact_type {
                return Err(parsing_error(
                    task,
                    key,
                    format!(
                        "executor output changes artifact type from {} to {}",
                        slot.artifact_type, new.artifact_type
                    ),
                ));
            }
            let mut merged = new.clone();
            if merged.name.is_empty() {
                merged.name = slot.name.clone();
            }
            if merged.uri.is_empty() {
                merged.uri = slot.uri.clone();
            }
            *slot = merged;
        }
    }
    Ok(skeleton)
}

/// Produce the single output artifact of an importer task.
///
/// Without `reimport`, a live artifact of the same URI and type already in
/// the pipeline context is reused instead of registering a new one.
pub fn synthesize_importer_outputs(
    task: &PipelineTaskSpec,
    importer: &ImporterSpec,
    spec: &PipelineSpec,
    ctx: &RunContext,
    metadata: &dyn MetadataStore,
) -> Result<TaskOutputs> {
    let key = match task.outputs.artifacts.keys().next() {
        Some(key) if task.outputs.artifacts.len() == 1 => key.clone(),
        _ => {
            return Err(EngineError::InvalidSpec(format!(
                "importer task '{}' must declare exactly one output artifact",
                task.name
            )));
        }
    };

    let uri = match resolve_value(&importer.artifact_uri, &task.name, spec, ctx)? {
        Value::String(uri) => uri,
        other => {
            return Err(EngineError::InvalidSpec(format!(
                "importer task '{}': artifact_uri must be a string, got {}",
                task.name,
                other.primitive_type()
            )));
        }
    };

    let mut existing = None;
    if !importer.reimport {
        let filter = ArtifactFilter::new()
            .with(FilterField::ContextName, FilterLiteral::string(&ctx.pipeline_name))
            .with(FilterField::Uri, FilterLiteral::string(&uri))
            .with(
                FilterField::ArtifactType,
                FilterLiteral::string(importer.type_schema.identity()),
            )
            .with(
                FilterField::State,
                FilterLiteral::string(ArtifactState::Live.to_string()),
            );
        existing = metadata.query_artifacts(&filter, 1)?.into_iter().next();
    }

    let artifact = match existing {
        Some(stored) => {
            info!(task = %task.name, uri = %uri, id = stored.id, "reusing previously imported artifact");
            stored.artifact
        }
        None => {
            let mut artifact = RuntimeArtifact::new(
                format!("{}.{}", task.name, key),
                importer.type_schema.clone(),
                uri,
            );
            for (name, v) in &importer.properties {
                artifact
                    .properties
                    .insert(name.clone(), resolve_value(v, &task.name, spec, ctx)?);
            }
            for (name, v) in &importer.custom_properties {
                artifact
                    .custom_properties
                    .insert(name.clone(), resolve_value(v, &task.name, spec, ctx)?);
            }
            if importer.reimport {
                debug!(task = %task.name, uri = %artifact.uri, "reimport requested; registering new artifact");
            }
            artifact
        }
    };

    if task.outputs.artifacts[&key].artifact_type != artifact.artifact_type {
        warn!(
            task = %task.name,
            declared = %task.outputs.artifacts[&key].artifact_type,
            imported = %artifact.artifact_type,
            "imported artifact type differs from declared output type"
        );
    }

    let mut outputs = TaskOutputs::default();
    outputs.artifacts.insert(key, vec![Arc::new(artifact)]);
    Ok(outputs)
}
