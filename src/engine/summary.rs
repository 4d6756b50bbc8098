// src/engine/summary.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dag::TaskRunState;
use crate::outputs::TaskOutputs;

use super::TaskName;

/// Final state of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub pipeline: String,
    pub states: BTreeMap<TaskName, TaskRunState>,
    /// Failure reason per failed or canceled task.
    pub failures: BTreeMap<TaskName, String>,
    pub outputs: BTreeMap<TaskName, TaskOutputs>,
}

impl RunSummary {
    /// The job succeeded iff every task produced its outputs.
    pub fn succeeded(&self) -> bool {
        self.states.values().all(|s| s.has_outputs())
    }

    pub fn state_of(&self, task: &str) -> Option<TaskRunState> {
        self.states.get(task).copied()
    }

    /// Tasks that did not produce outputs, in name order.
    pub fn unfinished_tasks(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| !s.has_outputs())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
