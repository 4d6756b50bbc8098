// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::{ContainerInvocation, ExecutorBackend};

use super::core::CoreRuntime;
use super::summary::RunSummary;
use super::{CoreCommand, CoreStep, RuntimeEvent, TaskName};

/// Drives a [`CoreRuntime`] with events from its channel and carries out the
/// resulting commands on an `ExecutorBackend`.
///
/// All run semantics live in the core; this is the async IO shell.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Run the pipeline to completion (or shutdown) and report the outcome.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(job = %self.core.context().job_name, "pipeline run started");

        let step = self.core.start();
        let mut keep_running = self.execute(step).await?;

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                warn!("runtime event channel closed before the run finished");
                break;
            };
            debug!(?event, "runtime received event");
            let step = self.core.step(event);
            keep_running = self.execute(step).await?;
        }

        let summary = self.core.summary();
        info!(
            job = %summary.job,
            succeeded = summary.succeeded(),
            "pipeline run ended"
        );
        Ok(summary)
    }

    /// Carry out the commands of one core step; returns `keep_running`.
    async fn execute(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            match command {
                CoreCommand::Dispatch(invocations) => self.dispatch(invocations).await?,
                CoreCommand::Cancel(tasks) => self.cancel(tasks).await?,
                CoreCommand::RequestExit => debug!("core issued RequestExit command"),
            }
        }
        Ok(step.keep_running)
    }

    async fn dispatch(&mut self, invocations: Vec<ContainerInvocation>) -> Result<()> {
        if invocations.is_empty() {
            return Ok(());
        }
        let names: Vec<_> = invocations.iter().map(|i| i.task.as_str()).collect();
        debug!(?names, "dispatching container tasks");
        self.executor.dispatch(invocations).await
    }

    async fn cancel(&mut self, tasks: Vec<TaskName>) -> Result<()> {
        debug!(?tasks, "cancelling running tasks");
        self.executor.cancel(tasks).await
    }
}
