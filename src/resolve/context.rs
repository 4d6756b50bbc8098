// src/resolve/context.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{CompiledJob, EngineConfig};
use crate::ir::Value;

/// Where a run's outputs live.
///
/// Locations only depend on the job name, the task name and the output key,
/// so a retried task writes to the same places:
///
/// - artifact URI:        `<output_root>/<job>/<task>/<key>`
/// - parameter file:      `<local_root>/<job>/<task>/parameters/<key>`
/// - executor output:     `<local_root>/<job>/<task>/executor_output.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    output_root: String,
    local_root: PathBuf,
}

impl OutputLayout {
    pub fn new(output_root: impl Into<String>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            local_root: local_root.into(),
        }
    }

    pub fn output_root(&self) -> &str {
        &self.output_root
    }

    pub fn artifact_uri(&self, job: &str, task: &str, key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.output_root.trim_end_matches('/'),
            job,
            task,
            key
        )
    }

    pub fn parameter_file(&self, job: &str, task: &str, key: &str) -> PathBuf {
        self.task_dir(job, task).join("parameters").join(key)
    }

    pub fn executor_output_file(&self, job: &str, task: &str) -> PathBuf {
        self.task_dir(job, task).join("executor_output.json")
    }

    fn task_dir(&self, job: &str, task: &str) -> PathBuf {
        self.local_root.join(job).join(task)
    }
}

/// The pipeline/run context, passed explicitly through resolution.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Pipeline name: the metadata context resolver queries are scoped to
    /// and the namespace of cache entries.
    pub pipeline_name: String,
    /// Job name: identifies this run.
    pub job_name: String,
    /// Job-supplied runtime parameter values (already type-checked).
    pub runtime_parameters: BTreeMap<String, Value>,
    pub layout: OutputLayout,
}

impl RunContext {
    /// Build the context for a compiled job. The job's output directory,
    /// when given, wins over the engine's `output_root`.
    pub fn new(job: &CompiledJob, cfg: &EngineConfig) -> Self {
        let output_root = job
            .output_directory()
            .map(str::to_string)
            .unwrap_or_else(|| cfg.engine.output_root.clone());

        Self {
            pipeline_name: job.spec().pipeline_info.name.clone(),
            job_name: job.name().to_string(),
            runtime_parameters: job.runtime_parameters().clone(),
            layout: OutputLayout::new(output_root, cfg.engine.local_root.clone()),
        }
    }

    pub fn artifact_uri(&self, task: &str, key: &str) -> String {
        self.layout.artifact_uri(&self.job_name, task, key)
    }

    pub fn parameter_file(&self, task: &str, key: &str) -> PathBuf {
        self.layout.parameter_file(&self.job_name, task, key)
    }

    pub fn executor_output_file(&self, task: &str) -> PathBuf {
        self.layout.executor_output_file(&self.job_name, task)
    }
}
