// src/outputs/store.rs

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::TaskName;
use crate::fs::FileSystem;
use crate::ir::{RuntimeArtifact, Value};

/// Outputs recorded for one task instance.
///
/// Artifacts are shared with consumers through `Arc`; a downstream task
/// references the producer's artifact rather than copying it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutputs {
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, Vec<Arc<RuntimeArtifact>>>,
}

impl TaskOutputs {
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn artifacts(&self, key: &str) -> Option<&[Arc<RuntimeArtifact>]> {
        self.artifacts.get(key).map(|v| v.as_slice())
    }

    /// Owned copy of the artifacts, as used in executor documents.
    pub fn artifact_lists(&self) -> BTreeMap<String, Vec<RuntimeArtifact>> {
        self.artifacts
            .iter()
            .map(|(k, list)| (k.clone(), list.iter().map(|a| (**a).clone()).collect()))
            .collect()
    }
}

/// Outputs of completed tasks, keyed by task name within one pipeline run.
///
/// Each entry is written by the owning task's ingestion step only and is
/// immutable once recorded; a re-run of the task replaces the whole entry.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    tasks: HashMap<TaskName, Arc<TaskOutputs>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outputs of a task, replacing any earlier attempt.
    pub fn record(&mut self, task: &str, outputs: TaskOutputs) -> Arc<TaskOutputs> {
        let outputs = Arc::new(outputs);
        if self.tasks.insert(task.to_string(), Arc::clone(&outputs)).is_some() {
            info!(task = %task, "overwriting outputs recorded by a previous attempt");
        } else {
            debug!(
                task = %task,
                parameters = outputs.parameters.len(),
                artifacts = outputs.artifacts.len(),
                "recorded task outputs"
            );
        }
        outputs
    }

    pub fn get(&self, task: &str) -> Option<&Arc<TaskOutputs>> {
        self.tasks.get(task)
    }

    /// Drop the outputs of a task, e.g. after it was canceled.
    pub fn mark_absent(&mut self, task: &str) -> bool {
        self.tasks.remove(task).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Sorted snapshot, the persisted layout of recorded outputs.
    pub fn snapshot(&self) -> BTreeMap<TaskName, TaskOutputs> {
        self.tasks
            .iter()
            .map(|(name, outputs)| (name.clone(), (**outputs).clone()))
            .collect()
    }

    /// Persist the recorded outputs as JSON keyed by task name.
    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        write_outputs(fs, path, &self.snapshot())
    }

    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let contents = fs.read_to_string(path)?;
        let snapshot: BTreeMap<TaskName, TaskOutputs> = serde_json::from_str(&contents)
            .with_context(|| format!("parsing recorded task outputs at {:?}", path))?;
        Ok(Self {
            tasks: snapshot
                .into_iter()
                .map(|(name, outputs)| (name, Arc::new(outputs)))
                .collect(),
        })
    }
}

/// Write a snapshot of recorded outputs in the layout [`OutputStore::load`]
/// reads back.
pub fn write_outputs(
    fs: &dyn FileSystem,
    path: &Path,
    outputs: &BTreeMap<TaskName, TaskOutputs>,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(outputs).context("serializing recorded task outputs")?;
    fs.write(path, &json)?;
    info!(path = ?path, tasks = outputs.len(), "saved recorded task outputs");
    Ok(())
}
