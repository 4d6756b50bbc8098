// src/dag/task_info.rs

//! Task run states and scheduled task descriptions.

use std::fmt;

use serde::Serialize;

use crate::engine::TaskName;

/// State of a task within the current pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskRunState {
    /// Waiting on upstream tasks.
    Pending,
    /// Dispatched: being resolved, executed or ingested.
    Running,
    /// Executed and its outputs recorded.
    Succeeded,
    /// Outputs reused from a previous execution.
    Cached,
    /// Resolution, execution or ingestion failed.
    Failed,
    /// Never ran because an upstream task did not succeed.
    Blocked,
    /// Cancelled before or during execution.
    Canceled,
}

impl TaskRunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskRunState::Pending | TaskRunState::Running)
    }

    /// Whether downstream tasks may consume this task's outputs.
    pub fn has_outputs(self) -> bool {
        matches!(self, TaskRunState::Succeeded | TaskRunState::Cached)
    }
}

impl fmt::Display for TaskRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskRunState::Pending => "pending",
            TaskRunState::Running => "running",
            TaskRunState::Succeeded => "succeeded",
            TaskRunState::Cached => "cached",
            TaskRunState::Failed => "failed",
            TaskRunState::Blocked => "blocked",
            TaskRunState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Static task information plus per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub executor_label: String,
    /// Direct upstream tasks.
    pub deps: Vec<TaskName>,
    pub state: TaskRunState,
}

impl TaskInfo {
    pub fn new(name: TaskName, executor_label: String, deps: Vec<TaskName>) -> Self {
        Self {
            name,
            executor_label,
            deps,
            state: TaskRunState::Pending,
        }
    }
}

/// Description of a task that the scheduler wants dispatched now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub executor_label: String,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            name: info.name.clone(),
            executor_label: info.executor_label.clone(),
        }
    }
}
