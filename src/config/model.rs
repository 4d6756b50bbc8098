// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::dag::TaskGraph;
use crate::ir::{PipelineSpec, RawPipelineJob, Value};
use crate::types::CacheStorageMode;

/// Engine configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// output_root = "file:///tmp/dagspec"
/// local_root = ".dagspec/runs"
/// max_parallel = 4
///
/// [cache]
/// enabled = true
/// storage = "file"
/// path = ".dagspec/cache.json"
///
/// [metadata]
/// seed = "artifacts.json"
/// ```
///
/// All sections are optional. Not validated; see [`EngineConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub metadata: MetadataSection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Root URI of output artifacts, unless the job sets its own output
    /// directory.
    #[serde(default = "default_output_root")]
    pub output_root: String,

    /// Directory holding output-parameter files and executor output
    /// documents.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    /// Maximum number of container tasks running at once.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_output_root() -> String {
    "file:///tmp/dagspec".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".dagspec/runs")
}

fn default_max_parallel() -> usize {
    4
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            local_root: default_local_root(),
            max_parallel: default_max_parallel(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Global switch; tasks still opt in through their caching options.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub storage: CacheStorageMode,

    /// Cache file for `storage = "file"`.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".dagspec/cache.json")
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            storage: CacheStorageMode::default(),
            path: default_cache_path(),
        }
    }
}

/// `[metadata]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataSection {
    /// JSON array of artifacts loaded into the metadata store at startup.
    #[serde(default)]
    pub seed: Option<PathBuf>,
}

/// Validated engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub cache: CacheSection,
    pub metadata: MetadataSection,
}

impl EngineConfig {
    pub(crate) fn new_unchecked(raw: RawEngineConfig) -> Self {
        Self {
            engine: raw.engine,
            cache: raw.cache,
            metadata: raw.metadata,
        }
    }
}

/// A validated job: the pipeline, its dependency graph and the runtime
/// parameter values it runs with.
#[derive(Debug, Clone)]
pub struct CompiledJob {
    name: String,
    spec: Arc<PipelineSpec>,
    graph: TaskGraph,
    labels: BTreeMap<String, String>,
    runtime_parameters: BTreeMap<String, Value>,
    output_directory: Option<String>,
}

impl CompiledJob {
    /// Assemble a job from parts that were already checked.
    pub(crate) fn new_unchecked(
        raw: RawPipelineJob,
        graph: TaskGraph,
        runtime_parameters: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            name: raw.name,
            spec: Arc::new(raw.pipeline_spec),
            graph,
            labels: raw.labels,
            runtime_parameters,
            output_directory: raw.runtime_config.gcs_output_directory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> Arc<PipelineSpec> {
        Arc::clone(&self.spec)
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Supplied runtime parameter values, coerced to their declared types.
    pub fn runtime_parameters(&self) -> &BTreeMap<String, Value> {
        &self.runtime_parameters
    }

    pub fn output_directory(&self) -> Option<&str> {
        self.output_directory.as_deref()
    }
}
