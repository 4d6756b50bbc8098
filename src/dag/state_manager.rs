// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::TaskGraph;
use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, tasks: &'a mut BTreeMap<TaskName, TaskInfo>) -> Self {
        Self { graph, tasks }
    }

    /// Mark every not-yet-terminal transitive dependent of `root` as
    /// `Blocked`.
    ///
    /// Returns the newly blocked tasks (excluding `root`).
    pub fn mark_dependents_blocked(&mut self, root: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(root).to_vec();
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut newly_blocked = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            if let Some(info) = self.tasks.get_mut(&name) {
                match info.state {
                    TaskRunState::Pending => {
                        info.state = TaskRunState::Blocked;
                        debug!(
                            task = %info.name,
                            upstream = %root,
                            "marking dependent as Blocked due to upstream failure"
                        );
                        newly_blocked.push(info.name.clone());
                    }
                    TaskRunState::Running => {
                        // Cannot happen while the scheduler only dispatches
                        // tasks whose upstream has outputs.
                        warn!(
                            task = %info.name,
                            upstream = %root,
                            "dependent already running while upstream lost its outputs"
                        );
                    }
                    _ => {}
                }
            }
            stack.extend(self.graph.dependents_of(&name).iter().cloned());
        }

        newly_blocked
    }

    /// Collect tasks that are `Pending` and whose dependencies all have
    /// outputs, mark them as `Running`, and return them as `ScheduledTask`s.
    ///
    /// Tasks are returned in topological order.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let mut ready = Vec::new();

        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<TaskName> = self
            .graph
            .topological_order()
            .iter()
            .filter(|name| {
                self.tasks.get(name.as_str()).is_some_and(|info| {
                    info.state == TaskRunState::Pending
                        && ReadOnlyStateManager::new(&*self.tasks).deps_satisfied_for_info(info)
                })
            })
            .cloned()
            .collect();

        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(task = %info.name, executor = %info.executor_label, "scheduling task");
                info.state = TaskRunState::Running;
                ready.push(ScheduledTask::from_task_info(info));
            }
        }

        ready
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|info| info.state.is_terminal())
    }
}

/// A read-only view used for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a BTreeMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a BTreeMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// A task may run once every direct upstream task has outputs recorded.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => dep.state.has_outputs(),
            None => {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                false
            }
        })
    }
}
