// src/resolve/inputs.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::ir::{
    ArtifactList, ExecutorInput, InputParameterSpec, Inputs, OutputParameter, Outputs,
    PipelineSpec, PipelineTaskSpec, RuntimeArtifact, Value, ValueOrRuntimeParameter,
};
use crate::outputs::OutputStore;

use super::context::RunContext;

/// Concrete inputs of a task, ready to be placed into an `ExecutorInput`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    pub parameters: BTreeMap<String, Value>,
    /// Artifacts shared with the producer's recorded outputs.
    pub artifacts: BTreeMap<String, Vec<Arc<RuntimeArtifact>>>,
}

/// Resolve a constant or runtime-parameter reference.
///
/// A runtime parameter takes the job-supplied value, then the declared
/// default; with neither it is a [`EngineError::MissingParameter`].
pub fn resolve_value(
    value: &ValueOrRuntimeParameter,
    task: &str,
    spec: &PipelineSpec,
    ctx: &RunContext,
) -> Result<Value> {
    match value {
        ValueOrRuntimeParameter::ConstantValue(v) => Ok(v.clone()),
        ValueOrRuntimeParameter::RuntimeParameter(name) => {
            if let Some(v) = ctx.runtime_parameters.get(name) {
                return Ok(v.clone());
            }
            spec.runtime_parameters
                .get(name)
                .and_then(|decl| decl.default_value.clone())
                .ok_or_else(|| EngineError::MissingParameter {
                    task: task.to_string(),
                    parameter: name.clone(),
                })
        }
    }
}

/// Resolve every declared input of `task` against the run context and the
/// outputs recorded so far.
///
/// Pure with respect to its arguments: the same upstream state yields the
/// same result.
pub fn resolve_task_inputs(
    task: &PipelineTaskSpec,
    spec: &PipelineSpec,
    ctx: &RunContext,
    outputs: &OutputStore,
) -> Result<ResolvedInputs> {
    let mut resolved = ResolvedInputs::default();

    for (key, param) in &task.inputs.parameters {
        let value = match param {
            InputParameterSpec::TaskOutputParameter {
                producer_task,
                output_parameter_key,
            } => {
                let recorded = outputs.get(producer_task).ok_or_else(|| {
                    EngineError::UnresolvedDependency {
                        task: task.name.clone(),
                        reference: format!(
                            "'{producer_task}.{output_parameter_key}' (producer has not completed)"
                        ),
                    }
                })?;
                recorded
                    .parameter(output_parameter_key)
                    .cloned()
                    .ok_or_else(|| EngineError::UnresolvedDependency {
                        task: task.name.clone(),
                        reference: format!(
                            "'{producer_task}.{output_parameter_key}' (producer did not output it)"
                        ),
                    })?
            }
            InputParameterSpec::RuntimeValue(v) => resolve_value(v, &task.name, spec, ctx)?,
        };
        resolved.parameters.insert(key.clone(), value);
    }

    for (key, artifact) in &task.inputs.artifacts {
        let producer = &artifact.producer_task;
        let output_key = &artifact.output_artifact_key;
        let recorded = outputs
            .get(producer)
            .ok_or_else(|| EngineError::UnresolvedDependency {
                task: task.name.clone(),
                reference: format!("'{producer}.{output_key}' (producer has not completed)"),
            })?;
        let list = recorded
            .artifacts(output_key)
            .ok_or_else(|| EngineError::UnresolvedDependency {
                task: task.name.clone(),
                reference: format!("'{producer}.{output_key}' (producer did not output it)"),
            })?;
        resolved.artifacts.insert(key.clone(), list.to_vec());
    }

    debug!(
        task = %task.name,
        parameters = resolved.parameters.len(),
        artifacts = resolved.artifacts.len(),
        "resolved task inputs"
    );

    Ok(resolved)
}

/// Build the `ExecutorInput` for one dispatch: resolved inputs plus the
/// engine-allocated output locations and output artifact skeletons.
pub fn build_executor_input(
    task: &PipelineTaskSpec,
    spec: &PipelineSpec,
    ctx: &RunContext,
    resolved: &ResolvedInputs,
) -> Result<ExecutorInput> {
    let inputs = Inputs {
        parameters: resolved.parameters.clone(),
        artifacts: resolved
            .artifacts
            .iter()
            .map(|(k, list)| {
                let owned: Vec<RuntimeArtifact> = list.iter().map(|a| (**a).clone()).collect();
                (k.clone(), ArtifactList::from(owned))
            })
            .collect(),
    };

    let parameters = task
        .outputs
        .parameters
        .keys()
        .map(|key| {
            let path = ctx.parameter_file(&task.name, key);
            (
                key.clone(),
                OutputParameter {
                    output_file: path.to_string_lossy().into_owned(),
                },
            )
        })
        .collect();

    let mut artifacts = BTreeMap::new();
    for (key, out) in &task.outputs.artifacts {
        let mut artifact = RuntimeArtifact::new(
            format!("{}.{}", task.name, key),
            out.artifact_type.clone(),
            ctx.artifact_uri(&task.name, key),
        );
        for (name, v) in &out.properties {
            artifact
                .properties
                .insert(name.clone(), resolve_value(v, &task.name, spec, ctx)?);
        }
        for (name, v) in &out.custom_properties {
            artifact
                .custom_properties
                .insert(name.clone(), resolve_value(v, &task.name, spec, ctx)?);
        }
        artifacts.insert(key.clone(), ArtifactList::from(vec![artifact]));
    }

    Ok(ExecutorInput {
        inputs,
        outputs: Outputs {
            parameters,
            artifacts,
            output_file: ctx
                .executor_output_file(&task.name)
                .to_string_lossy()
                .into_owned(),
        },
    })
}
