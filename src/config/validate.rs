// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::config::model::{CompiledJob, EngineConfig, RawEngineConfig};
use crate::dag::TaskGraph;
use crate::errors::{EngineError, Result};
use crate::ir::{
    ExecutorSpec, InputParameterSpec, PipelineSpec, PipelineTaskSpec, RawPipelineJob, Value,
    ValueOrRuntimeParameter,
};
use crate::resolve::query::parse_filter;
use crate::types::CacheStorageMode;

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = EngineError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        if raw.engine.max_parallel == 0 {
            return Err(EngineError::Config(
                "[engine].max_parallel must be >= 1 (got 0)".to_string(),
            ));
        }
        if raw.engine.output_root.trim().is_empty() {
            return Err(EngineError::Config(
                "[engine].output_root must not be empty".to_string(),
            ));
        }
        if raw.cache.storage == CacheStorageMode::File && raw.cache.path.as_os_str().is_empty() {
            return Err(EngineError::Config(
                "[cache].path is required when storage = \"file\"".to_string(),
            ));
        }
        Ok(EngineConfig::new_unchecked(raw))
    }
}

impl TryFrom<RawPipelineJob> for CompiledJob {
    type Error = EngineError;

    fn try_from(mut raw: RawPipelineJob) -> std::result::Result<Self, Self::Error> {
        validate_names(&raw)?;
        normalize_defaults(&mut raw.pipeline_spec)?;
        let runtime_parameters = check_supplied_parameters(&raw)?;
        validate_tasks(&raw.pipeline_spec)?;
        let graph = TaskGraph::build(&raw.pipeline_spec)?;

        debug!(
            job = %raw.name,
            tasks = graph.len(),
            edges = graph.edge_count(),
            "compiled pipeline job"
        );
        Ok(CompiledJob::new_unchecked(raw, graph, runtime_parameters))
    }
}

/// Job names, task names and output keys become single components of
/// output paths and URIs.
fn check_path_segment(what: &str, name: &str) -> Result<()> {
    let unsafe_segment =
        name == "." || name.contains("..") || name.contains(['/', '\\', '\0']);
    if unsafe_segment {
        return Err(EngineError::InvalidSpec(format!(
            "{what} '{name}' must not contain path separators or '..'"
        )));
    }
    Ok(())
}

fn validate_names(raw: &RawPipelineJob) -> Result<()> {
    if raw.name.trim().is_empty() {
        return Err(EngineError::InvalidSpec("job name must not be empty".to_string()));
    }
    check_path_segment("job name", &raw.name)?;
    if raw.pipeline_spec.pipeline_info.name.trim().is_empty() {
        return Err(EngineError::InvalidSpec(
            "pipeline_info.name must not be empty".to_string(),
        ));
    }
    if raw.pipeline_spec.tasks.is_empty() {
        return Err(EngineError::InvalidSpec(
            "pipeline must contain at least one task".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for task in &raw.pipeline_spec.tasks {
        if task.name.trim().is_empty() {
            return Err(EngineError::InvalidSpec("task name must not be empty".to_string()));
        }
        if !seen.insert(task.name.as_str()) {
            return Err(EngineError::InvalidSpec(format!(
                "task '{}' is declared more than once",
                task.name
            )));
        }
        check_path_segment("task name", &task.name)?;
        for key in task
            .outputs
            .parameters
            .keys()
            .chain(task.outputs.artifacts.keys())
        {
            if key.is_empty() {
                return Err(EngineError::InvalidSpec(format!(
                    "task '{}' declares an output with an empty key",
                    task.name
                )));
            }
            check_path_segment(&format!("task '{}' output key", task.name), key)?;
        }
    }
    Ok(())
}

/// Check declared defaults against their types, widening INT defaults of
/// DOUBLE parameters.
fn normalize_defaults(spec: &mut PipelineSpec) -> Result<()> {
    for (name, decl) in spec.runtime_parameters.iter_mut() {
        if let Some(default) = decl.default_value.take() {
            let coerced = default.coerce_to(decl.parameter_type).ok_or_else(|| {
                EngineError::InvalidSpec(format!(
                    "runtime parameter '{name}' is declared {} but its default is {}",
                    decl.parameter_type,
                    default.primitive_type()
                ))
            })?;
            decl.default_value = Some(coerced);
        }
    }
    Ok(())
}

fn check_supplied_parameters(raw: &RawPipelineJob) -> Result<BTreeMap<String, Value>> {
    let declared = &raw.pipeline_spec.runtime_parameters;
    let mut params = BTreeMap::new();

    for (name, value) in &raw.runtime_config.parameters {
        let Some(decl) = declared.get(name) else {
            warn!(job = %raw.name, parameter = %name, "ignoring undeclared runtime parameter");
            continue;
        };
        let coerced = value.coerce_to(decl.parameter_type).ok_or_else(|| {
            EngineError::InvalidSpec(format!(
                "runtime parameter '{name}' is declared {} but the job supplies {}",
                decl.parameter_type,
                value.primitive_type()
            ))
        })?;
        params.insert(name.clone(), coerced);
    }
    Ok(params)
}

fn validate_tasks(spec: &PipelineSpec) -> Result<()> {
    for task in &spec.tasks {
        let executor = spec.executor_for(task).ok_or_else(|| {
            EngineError::InvalidSpec(format!(
                "task '{}' uses executor '{}' which is not in deployment_config",
                task.name, task.executor_label
            ))
        })?;

        for param in task.inputs.parameters.values() {
            if let InputParameterSpec::RuntimeValue(v) = param {
                check_parameter_reference(spec, task, v)?;
            }
        }
        for out in task.outputs.artifacts.values() {
            for v in out.properties.values().chain(out.custom_properties.values()) {
                check_parameter_reference(spec, task, v)?;
            }
        }

        match executor {
            ExecutorSpec::Container(container) => {
                if container.command.is_empty() && container.args.is_empty() {
                    return Err(EngineError::InvalidSpec(format!(
                        "task '{}': container executor '{}' has neither command nor args",
                        task.name, task.executor_label
                    )));
                }
            }
            ExecutorSpec::Importer(importer) => {
                reject_output_parameters(task, "importer")?;
                if task.outputs.artifacts.len() != 1 {
                    return Err(EngineError::InvalidSpec(format!(
                        "importer task '{}' must declare exactly one output artifact",
                        task.name
                    )));
                }
                check_parameter_reference(spec, task, &importer.artifact_uri)?;
                for v in importer
                    .properties
                    .values()
                    .chain(importer.custom_properties.values())
                {
                    check_parameter_reference(spec, task, v)?;
                }
            }
            ExecutorSpec::Resolver(resolver) => {
                reject_output_parameters(task, "resolver")?;
                if let Some(key) = task
                    .outputs
                    .artifacts
                    .keys()
                    .find(|key| !resolver.output_artifact_queries.contains_key(*key))
                {
                    return Err(EngineError::InvalidSpec(format!(
                        "resolver task '{}' declares output '{key}' without a query for it",
                        task.name
                    )));
                }
                for (key, query) in &resolver.output_artifact_queries {
                    if !task.outputs.artifacts.contains_key(key) {
                        return Err(EngineError::InvalidSpec(format!(
                            "resolver task '{}' queries output '{key}' which it does not declare",
                            task.name
                        )));
                    }
                    parse_filter(&task.name, &query.filter)?;
                }
            }
        }
    }
    Ok(())
}

/// Importer and resolver tasks only ever produce artifacts.
fn reject_output_parameters(task: &PipelineTaskSpec, kind: &str) -> Result<()> {
    match task.outputs.parameters.keys().next() {
        Some(key) => Err(EngineError::InvalidSpec(format!(
            "{kind} task '{}' declares output parameter '{key}', which it cannot produce",
            task.name
        ))),
        None => Ok(()),
    }
}

fn check_parameter_reference(
    spec: &PipelineSpec,
    task: &PipelineTaskSpec,
    value: &ValueOrRuntimeParameter,
) -> Result<()> {
    match value {
        ValueOrRuntimeParameter::RuntimeParameter(name)
            if !spec.runtime_parameters.contains_key(name) =>
        {
            Err(EngineError::InvalidSpec(format!(
                "task '{}' references undeclared runtime parameter '{name}'",
                task.name
            )))
        }
        _ => Ok(()),
    }
}
