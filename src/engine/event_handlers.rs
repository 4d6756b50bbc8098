// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::CacheKey;
use crate::dag::{ScheduledTask, TaskRunState};
use crate::errors::{EngineError, Result};
use crate::exec::ContainerInvocation;
use crate::outputs::{
    ingest_container_outputs, publish_canceled_execution, publish_failed_execution,
    publish_succeeded_execution,
};

use super::core::{CoreRuntime, InFlight};
use super::dispatch::{DispatchContext, Prepared, prepare_task};
use super::{TaskName, TaskOutcome};

/// Command produced by the core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these invocations to the executor backend.
    Dispatch(Vec<ContainerInvocation>),
    /// Stop these running invocations.
    Cancel(Vec<TaskName>),
    /// Every task is terminal; the shell may exit.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep waiting for events.
    pub keep_running: bool,
}

impl CoreStep {
    /// Invocations dispatched by this step, in dispatch order.
    pub fn dispatched(&self) -> Vec<&ContainerInvocation> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(list) => Some(list.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl CoreRuntime {
    /// Prepare every ready task. In-process completions (importer, resolver,
    /// cache hit) may make further tasks ready; those are prepared in the
    /// same step.
    pub(super) fn dispatch_ready(&mut self, ready: Vec<ScheduledTask>) -> Vec<CoreCommand> {
        let mut queue: VecDeque<ScheduledTask> = ready.into();
        let mut invocations = Vec::new();

        while let Some(task) = queue.pop_front() {
            let prepared = {
                let dc = DispatchContext {
                    spec: &self.spec,
                    ctx: &self.ctx,
                    outputs: &self.outputs,
                    services: &self.services,
                };
                prepare_task(&task.name, &dc)
            };

            match prepared {
                Ok(Prepared::Container {
                    invocation,
                    fingerprint,
                }) => {
                    debug!(task = %task.name, executor = %task.executor_label, "dispatching container task");
                    self.in_flight.insert(
                        task.name.clone(),
                        InFlight {
                            input: invocation.executor_input.clone(),
                            fingerprint,
                        },
                    );
                    invocations.push(invocation);
                }
                Ok(Prepared::Completed { outputs, outcome }) => {
                    self.outputs.record(&task.name, outputs);
                    queue.extend(self.scheduler.handle_completion(&task.name, outcome));
                }
                Err(err) => self.fail_task(&task.name, None, err),
            }
        }

        if invocations.is_empty() {
            Vec::new()
        } else {
            vec![CoreCommand::Dispatch(invocations)]
        }
    }

    pub(super) fn handle_task_completion(&mut self, task: TaskName, outcome: TaskOutcome) -> CoreStep {
        let Some(flight) = self.in_flight.remove(&task) else {
            warn!(task = %task, ?outcome, "completion for task that is not in flight; ignoring");
            return self.finish_step(Vec::new());
        };

        let ready = match outcome {
            TaskOutcome::Success | TaskOutcome::Cached => match self.ingest(&task, &flight) {
                Ok(()) => self.scheduler.handle_completion(&task, TaskOutcome::Success),
                Err(err) => {
                    self.fail_task(&task, flight.fingerprint.as_deref(), err);
                    Vec::new()
                }
            },
            TaskOutcome::Failed(code) => {
                warn!(task = %task, exit_code = code, "container task failed");
                self.failures
                    .insert(task.clone(), format!("executor exited with code {code}"));
                self.publish_failure(&task, flight.fingerprint.as_deref());
                self.scheduler.step_completion(&task, TaskOutcome::Failed(code));
                Vec::new()
            }
        };

        let commands = self.dispatch_ready(ready);
        self.finish_step(commands)
    }

    pub(super) fn handle_cancel(&mut self, task: TaskName) -> CoreStep {
        let mut commands = Vec::new();

        match self.scheduler.state_of(&task) {
            Some(TaskRunState::Running) => {
                if self.in_flight.remove(&task).is_some() {
                    commands.push(CoreCommand::Cancel(vec![task.clone()]));
                }
                if let Err(e) = publish_canceled_execution(
                    self.services.metadata.as_ref(),
                    &self.ctx,
                    &task,
                ) {
                    warn!(task = %task, error = %e, "failed to publish canceled execution");
                }
            }
            Some(TaskRunState::Pending) => {
                debug!(task = %task, "canceling task before dispatch");
            }
            Some(state) => {
                debug!(task = %task, %state, "cancel for terminal task; ignoring");
                return self.finish_step(commands);
            }
            None => {
                warn!(task = %task, "cancel for unknown task; ignoring");
                return self.finish_step(commands);
            }
        }

        let step = self.scheduler.step_cancel(&task);
        if step.newly_failed.contains(&task) {
            self.outputs.mark_absent(&task);
            self.failures.insert(task, "canceled".to_string());
        }
        self.finish_step(commands)
    }

    /// Cancel everything that has not finished and stop.
    pub(super) fn handle_shutdown(&mut self) -> CoreStep {
        info!("shutdown requested; canceling unfinished tasks");

        let mut running: Vec<TaskName> = self.in_flight.drain().map(|(name, _)| name).collect();
        running.sort();

        for task in &running {
            if let Err(e) =
                publish_canceled_execution(self.services.metadata.as_ref(), &self.ctx, task)
            {
                warn!(task = %task, error = %e, "failed to publish canceled execution");
            }
        }

        let unfinished: Vec<TaskName> = self
            .scheduler
            .states()
            .into_iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(name, _)| name)
            .collect();
        for task in unfinished {
            let step = self.scheduler.step_cancel(&task);
            if step.newly_failed.contains(&task) {
                self.failures
                    .insert(task, "canceled by shutdown".to_string());
            }
        }

        let mut commands = Vec::new();
        if !running.is_empty() {
            commands.push(CoreCommand::Cancel(running));
        }
        commands.push(CoreCommand::RequestExit);
        CoreStep {
            commands,
            keep_running: false,
        }
    }

    fn ingest(&mut self, task: &str, flight: &InFlight) -> Result<()> {
        let spec = Arc::clone(&self.spec);
        let task_spec = spec
            .task(task)
            .ok_or_else(|| EngineError::InvalidSpec(format!("unknown task '{task}'")))?;

        let outputs = ingest_container_outputs(self.services.fs.as_ref(), task_spec, &flight.input)?;
        publish_succeeded_execution(
            self.services.metadata.as_ref(),
            &self.ctx,
            task,
            flight.fingerprint.as_deref(),
            &outputs,
        )?;

        if let (Some(fingerprint), Some(cache)) = (&flight.fingerprint, self.services.cache.as_mut()) {
            let key = CacheKey {
                context: self.ctx.pipeline_name.clone(),
                task: task.to_string(),
                fingerprint: fingerprint.clone(),
            };
            if let Err(e) = cache.save(&key, &outputs) {
                warn!(task = %task, key = %key, error = %e, "failed to store cache entry");
            }
        }

        self.outputs.record(task, outputs);
        Ok(())
    }

    /// Record a task failure; its dependents become blocked.
    fn fail_task(&mut self, task: &str, fingerprint: Option<&str>, err: EngineError) {
        error!(task = %task, error = %err, "task failed");
        self.failures.insert(task.to_string(), err.to_string());
        self.outputs.mark_absent(task);
        self.publish_failure(task, fingerprint);
        self.scheduler.step_completion(task, TaskOutcome::Failed(-1));
    }

    fn publish_failure(&self, task: &str, fingerprint: Option<&str>) {
        if let Err(e) =
            publish_failed_execution(self.services.metadata.as_ref(), &self.ctx, task, fingerprint)
        {
            warn!(task = %task, error = %e, "failed to publish failed execution");
        }
    }

    pub(super) fn finish_step(&self, mut commands: Vec<CoreCommand>) -> CoreStep {
        let finished = self.scheduler.is_finished();
        if finished {
            info!(
                job = %self.ctx.job_name,
                failed = self.failures.len(),
                "pipeline run finished"
            );
            commands.push(CoreCommand::RequestExit);
        }
        CoreStep {
            commands,
            keep_running: !finished,
        }
    }
}
