use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};
use crate::ir::PipelineSpec;

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is the sole ordering authority of a run:
/// - a task is dispatched only once all its upstream tasks have outputs
/// - a failed or canceled task blocks all of its transitive dependents
/// - independent branches keep running
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    tasks: BTreeMap<TaskName, TaskInfo>,
    started: bool,
    finished: bool,
}

impl Scheduler {
    /// Construct a scheduler for a validated spec and its graph.
    pub fn new(spec: &PipelineSpec, graph: TaskGraph) -> Self {
        let mut tasks = BTreeMap::new();

        for task in &spec.tasks {
            let deps = graph.dependencies_of(&task.name).to_vec();
            let info = TaskInfo::new(task.name.clone(), task.executor_label.clone(), deps);
            tasks.insert(task.name.clone(), info);
        }

        Self {
            graph,
            tasks,
            started: false,
            finished: false,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Whether every task has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn state_of(&self, task: &str) -> Option<TaskRunState> {
        self.tasks.get(task).map(|info| info.state)
    }

    /// Snapshot of every task's state.
    pub fn states(&self) -> BTreeMap<TaskName, TaskRunState> {
        self.tasks
            .iter()
            .map(|(name, info)| (name.clone(), info.state))
            .collect()
    }

    /// Start the run: dispatch every root task.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;
        debug!(tasks = self.tasks.len(), "scheduler: starting pipeline run");

        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    /// Production API: record an outcome and return newly ready tasks.
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.step_completion(task, outcome).newly_scheduled
    }

    /// Record the outcome of a running task.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.tasks.get_mut(task) {
            Some(info) if info.state == TaskRunState::Running => match outcome {
                TaskOutcome::Success | TaskOutcome::Cached => {
                    info.state = if outcome == TaskOutcome::Cached {
                        TaskRunState::Cached
                    } else {
                        TaskRunState::Succeeded
                    };
                    debug!(task = %info.name, state = %info.state, "task completed");
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                    step.newly_scheduled = manager.collect_new_ready_tasks();
                }
                TaskOutcome::Failed(code) => {
                    info.state = TaskRunState::Failed;
                    warn!(
                        task = %info.name,
                        exit_code = code,
                        "task failed; blocking dependents"
                    );
                    step.newly_failed.push(info.name.clone());
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                    step.newly_blocked = manager.mark_dependents_blocked(task);
                }
            },
            Some(info) => {
                warn!(
                    task = %task,
                    state = %info.state,
                    "completion for task that is not running; ignoring"
                );
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Cancel a pending or running task.
    ///
    /// The task becomes `Canceled` and its dependents `Blocked`. Terminal
    /// tasks are left untouched.
    pub fn step_cancel(&mut self, task: &str) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.tasks.get_mut(task) {
            Some(info) if !info.state.is_terminal() => {
                info!(task = %info.name, previous = %info.state, "canceling task");
                info.state = TaskRunState::Canceled;
                step.newly_failed.push(info.name.clone());
                let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                step.newly_blocked = manager.mark_dependents_blocked(task);
            }
            Some(info) => {
                debug!(task = %task, state = %info.state, "cancel for terminal task; ignoring");
            }
            None => {
                warn!(task = %task, "cancel for unknown task; ignoring");
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Mark the run finished once every task is terminal.
    ///
    /// Returns `true` if this call made the transition.
    fn maybe_finish_run(&mut self) -> bool {
        if self.finished || !self.started {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.tasks);
        if manager.all_tasks_terminal() {
            info!("scheduler: all tasks terminal; run finished");
            self.finished = true;
            true
        } else {
            false
        }
    }
}
