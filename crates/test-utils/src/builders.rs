use std::collections::BTreeMap;

use dagspec::config::{CompiledJob, EngineConfig};
use dagspec::ir::{
    ArtifactQuerySpec, ArtifactTypeSchema, CachingOptions, DeploymentConfig, ExecutorSpec,
    ImporterSpec, InputArtifactSpec, InputParameterSpec, Lifecycle, LifecycleExec,
    OutputArtifactSpec, OutputParameterSpec, PipelineContainerSpec, PipelineInfo, PipelineSpec,
    PipelineTaskSpec, PrimitiveType, QueryCardinality, RawPipelineJob, ResolverSpec,
    RuntimeConfig, RuntimeParameter, TaskInputsSpec, TaskOutputsSpec, Value,
    ValueOrRuntimeParameter,
};

/// Builder for `RawPipelineJob` / `CompiledJob` to simplify test setup.
pub struct PipelineJobBuilder {
    job: RawPipelineJob,
}

impl PipelineJobBuilder {
    pub fn new(job_name: &str, pipeline_name: &str) -> Self {
        Self {
            job: RawPipelineJob {
                name: job_name.to_string(),
                pipeline_spec: PipelineSpec {
                    pipeline_info: PipelineInfo {
                        name: pipeline_name.to_string(),
                        description: None,
                    },
                    tasks: Vec::new(),
                    deployment_config: DeploymentConfig::default(),
                    runtime_parameters: BTreeMap::new(),
                },
                labels: BTreeMap::new(),
                runtime_config: RuntimeConfig::default(),
            },
        }
    }

    pub fn with_task(mut self, task: PipelineTaskSpec) -> Self {
        self.job.pipeline_spec.tasks.push(task);
        self
    }

    pub fn with_executor(mut self, label: &str, executor: ExecutorSpec) -> Self {
        self.job
            .pipeline_spec
            .deployment_config
            .executors
            .insert(label.to_string(), executor);
        self
    }

    pub fn with_runtime_parameter(
        mut self,
        name: &str,
        ty: PrimitiveType,
        default: Option<Value>,
    ) -> Self {
        self.job.pipeline_spec.runtime_parameters.insert(
            name.to_string(),
            RuntimeParameter {
                parameter_type: ty,
                default_value: default,
            },
        );
        self
    }

    /// Job-supplied runtime parameter value.
    pub fn supply(mut self, name: &str, value: Value) -> Self {
        self.job
            .runtime_config
            .parameters
            .insert(name.to_string(), value);
        self
    }

    pub fn with_output_directory(mut self, uri: &str) -> Self {
        self.job.runtime_config.gcs_output_directory = Some(uri.to_string());
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.job.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build_raw(self) -> RawPipelineJob {
        self.job
    }

    pub fn build(self) -> CompiledJob {
        CompiledJob::try_from(self.job).expect("Failed to compile job from builder")
    }
}

/// Builder for `PipelineTaskSpec`.
pub struct TaskBuilder {
    task: PipelineTaskSpec,
}

impl TaskBuilder {
    pub fn new(name: &str, executor_label: &str) -> Self {
        Self {
            task: PipelineTaskSpec {
                name: name.to_string(),
                inputs: TaskInputsSpec::default(),
                outputs: TaskOutputsSpec::default(),
                executor_label: executor_label.to_string(),
                dependent_tasks: Vec::new(),
                caching_options: CachingOptions::default(),
            },
        }
    }

    pub fn param_from_task(mut self, input: &str, producer: &str, key: &str) -> Self {
        self.task.inputs.parameters.insert(
            input.to_string(),
            InputParameterSpec::TaskOutputParameter {
                producer_task: producer.to_string(),
                output_parameter_key: key.to_string(),
            },
        );
        self
    }

    pub fn param_constant(mut self, input: &str, value: Value) -> Self {
        self.task.inputs.parameters.insert(
            input.to_string(),
            InputParameterSpec::RuntimeValue(ValueOrRuntimeParameter::ConstantValue(value)),
        );
        self
    }

    pub fn param_runtime(mut self, input: &str, parameter: &str) -> Self {
        self.task.inputs.parameters.insert(
            input.to_string(),
            InputParameterSpec::RuntimeValue(ValueOrRuntimeParameter::RuntimeParameter(
                parameter.to_string(),
            )),
        );
        self
    }

    pub fn artifact_from_task(mut self, input: &str, producer: &str, key: &str) -> Self {
        self.task.inputs.artifacts.insert(
            input.to_string(),
            InputArtifactSpec {
                producer_task: producer.to_string(),
                output_artifact_key: key.to_string(),
            },
        );
        self
    }

    pub fn output_param(mut self, key: &str, ty: PrimitiveType) -> Self {
        self.task
            .outputs
            .parameters
            .insert(key.to_string(), OutputParameterSpec { parameter_type: ty });
        self
    }

    pub fn output_artifact(mut self, key: &str, schema_title: &str) -> Self {
        self.task.outputs.artifacts.insert(
            key.to_string(),
            OutputArtifactSpec {
                artifact_type: ArtifactTypeSchema::SchemaTitle(schema_title.to_string()),
                properties: BTreeMap::new(),
                custom_properties: BTreeMap::new(),
            },
        );
        self
    }

    /// Constant property on an already declared output artifact.
    pub fn output_artifact_property(mut self, key: &str, property: &str, value: Value) -> Self {
        if let Some(out) = self.task.outputs.artifacts.get_mut(key) {
            out.properties.insert(
                property.to_string(),
                ValueOrRuntimeParameter::ConstantValue(value),
            );
        }
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.dependent_tasks.push(dep.to_string());
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.task.caching_options.enable_cache = enabled;
        self
    }

    pub fn build(self) -> PipelineTaskSpec {
        self.task
    }
}

/// Builder for container executors.
pub struct ContainerBuilder {
    spec: PipelineContainerSpec,
}

impl ContainerBuilder {
    pub fn new(image: &str) -> Self {
        Self {
            spec: PipelineContainerSpec {
                image: image.to_string(),
                command: Vec::new(),
                args: Vec::new(),
                lifecycle: None,
            },
        }
    }

    pub fn command(mut self, parts: &[&str]) -> Self {
        self.spec.command = parts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn args(mut self, parts: &[&str]) -> Self {
        self.spec.args = parts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn pre_cache_check(mut self, command: &[&str], args: &[&str]) -> Self {
        self.spec.lifecycle = Some(Lifecycle {
            pre_cache_check: Some(LifecycleExec {
                command: command.iter().map(|s| s.to_string()).collect(),
                args: args.iter().map(|s| s.to_string()).collect(),
            }),
        });
        self
    }

    pub fn build(self) -> ExecutorSpec {
        ExecutorSpec::Container(self.spec)
    }
}

pub fn importer(uri: &str, schema_title: &str, reimport: bool) -> ExecutorSpec {
    ExecutorSpec::Importer(ImporterSpec {
        artifact_uri: ValueOrRuntimeParameter::ConstantValue(Value::String(uri.to_string())),
        type_schema: ArtifactTypeSchema::SchemaTitle(schema_title.to_string()),
        properties: BTreeMap::new(),
        custom_properties: BTreeMap::new(),
        reimport,
    })
}

/// Resolver executor from `(output key, filter, limit)` triples.
pub fn resolver(queries: &[(&str, &str, Option<u32>)]) -> ExecutorSpec {
    resolver_with_cardinality(queries, QueryCardinality::Required)
}

pub fn resolver_with_cardinality(
    queries: &[(&str, &str, Option<u32>)],
    cardinality: QueryCardinality,
) -> ExecutorSpec {
    ExecutorSpec::Resolver(ResolverSpec {
        output_artifact_queries: queries
            .iter()
            .map(|(key, filter, limit)| {
                (
                    key.to_string(),
                    ArtifactQuerySpec {
                        filter: filter.to_string(),
                        limit: *limit,
                        cardinality,
                    },
                )
            })
            .collect(),
    })
}

/// Engine config with in-memory friendly locations.
pub fn test_engine_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.engine.output_root = "mem://artifacts".to_string();
    cfg.engine.local_root = "/runs".into();
    cfg
}
