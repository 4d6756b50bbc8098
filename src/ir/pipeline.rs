// src/ir/pipeline.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::artifact::ArtifactTypeSchema;
use super::value::{PrimitiveType, Value};

/// A submitted pipeline job, as read from JSON.
///
/// ```json
/// {
///   "name": "nightly-42",
///   "pipeline_spec": { "pipeline_info": { "name": "train" }, "tasks": [ ... ] },
///   "labels": { "team": "ml" },
///   "runtime_config": { "parameters": { "epochs": { "int_value": 3 } } }
/// }
/// ```
///
/// Not validated; see [`crate::config::CompiledJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPipelineJob {
    pub name: String,
    pub pipeline_spec: PipelineSpec,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub runtime_config: RuntimeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Job-supplied runtime parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Root URI for output artifacts; overrides the engine's `output_root`.
    #[serde(default)]
    pub gcs_output_directory: Option<String>,
}

/// The compiled pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub pipeline_info: PipelineInfo,
    /// Tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<PipelineTaskSpec>,
    #[serde(default)]
    pub deployment_config: DeploymentConfig,
    /// Declared runtime parameters, keyed by name.
    #[serde(default)]
    pub runtime_parameters: BTreeMap<String, RuntimeParameter>,
}

impl PipelineSpec {
    pub fn task(&self, name: &str) -> Option<&PipelineTaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Executor bound to the given task, if both exist.
    pub fn executor_for(&self, task: &PipelineTaskSpec) -> Option<&ExecutorSpec> {
        self.deployment_config.executors.get(&task.executor_label)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Executor label -> executor spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub executors: BTreeMap<String, ExecutorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeParameter {
    #[serde(rename = "type")]
    pub parameter_type: PrimitiveType,
    #[serde(default)]
    pub default_value: Option<Value>,
}

/// A named node of the pipeline graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTaskSpec {
    pub name: String,
    #[serde(default)]
    pub inputs: TaskInputsSpec,
    #[serde(default)]
    pub outputs: TaskOutputsSpec,
    pub executor_label: String,
    /// Control-only upstream tasks.
    #[serde(default)]
    pub dependent_tasks: Vec<String>,
    #[serde(default)]
    pub caching_options: CachingOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachingOptions {
    #[serde(default)]
    pub enable_cache: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInputsSpec {
    #[serde(default)]
    pub parameters: BTreeMap<String, InputParameterSpec>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, InputArtifactSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputParameterSpec {
    TaskOutputParameter {
        producer_task: String,
        output_parameter_key: String,
    },
    RuntimeValue(ValueOrRuntimeParameter),
}

/// A compile-time constant or a reference to a named runtime parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueOrRuntimeParameter {
    ConstantValue(Value),
    RuntimeParameter(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputArtifactSpec {
    pub producer_task: String,
    pub output_artifact_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOutputsSpec {
    #[serde(default)]
    pub parameters: BTreeMap<String, OutputParameterSpec>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, OutputArtifactSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputParameterSpec {
    #[serde(rename = "type")]
    pub parameter_type: PrimitiveType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputArtifactSpec {
    pub artifact_type: ArtifactTypeSchema,
    /// Properties pre-populated on the allocated output artifact.
    #[serde(default)]
    pub properties: BTreeMap<String, ValueOrRuntimeParameter>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, ValueOrRuntimeParameter>,
}

/// How a task is executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorSpec {
    Container(PipelineContainerSpec),
    Importer(ImporterSpec),
    Resolver(ResolverSpec),
}

impl ExecutorSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorSpec::Container(_) => "container",
            ExecutorSpec::Importer(_) => "importer",
            ExecutorSpec::Resolver(_) => "resolver",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContainerSpec {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub lifecycle: Option<Lifecycle>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Runs before the cache fingerprint is computed.
    #[serde(default)]
    pub pre_cache_check: Option<LifecycleExec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleExec {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterSpec {
    pub artifact_uri: ValueOrRuntimeParameter,
    pub type_schema: ArtifactTypeSchema,
    #[serde(default)]
    pub properties: BTreeMap<String, ValueOrRuntimeParameter>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, ValueOrRuntimeParameter>,
    /// When false, an existing live artifact with the same URI and type is
    /// reused instead of registering a new one.
    #[serde(default)]
    pub reimport: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverSpec {
    /// Output artifact key -> query.
    #[serde(default)]
    pub output_artifact_queries: BTreeMap<String, ArtifactQuerySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactQuerySpec {
    pub filter: String,
    /// Maximum number of artifacts returned; `1` when unset.
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub cardinality: QueryCardinality,
}

/// Whether an empty query result is acceptable for an output key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCardinality {
    /// At least one artifact must be found.
    #[default]
    Required,
    /// Zero artifacts is an empty list, not an error.
    Unbounded,
}
