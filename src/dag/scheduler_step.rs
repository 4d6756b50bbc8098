// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were newly marked as failed or canceled in this step.
    pub newly_failed: Vec<TaskName>,
    /// Downstream tasks newly marked as blocked.
    pub newly_blocked: Vec<TaskName>,
    /// Whether this step caused every task to reach a terminal state.
    pub run_just_finished: bool,
}
