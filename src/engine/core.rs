// src/engine/core.rs

//! Core runtime state machine.
//!
//! `CoreRuntime` consumes [`RuntimeEvent`]s and produces [`CoreStep`]s: the
//! commands the async shell (`engine::runtime::Runtime`) should carry out.
//! It owns the scheduler, the recorded outputs and the collaborators, and
//! prepares tasks synchronously. It holds no channels and never awaits, so
//! it can be driven step by step in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::{CompiledJob, EngineConfig};
use crate::dag::{Scheduler, TaskGraph};
use crate::ir::{ExecutorInput, PipelineSpec};
use crate::outputs::OutputStore;
use crate::resolve::RunContext;

use super::event_handlers::CoreStep;
use super::summary::RunSummary;
use super::{RuntimeEvent, TaskName};

pub use super::dispatch::EngineServices;

/// A container invocation handed to the backend and not yet ingested.
#[derive(Debug)]
pub(super) struct InFlight {
    pub(super) input: ExecutorInput,
    pub(super) fingerprint: Option<String>,
}

#[derive(Debug)]
pub struct CoreRuntime {
    pub(super) spec: Arc<PipelineSpec>,
    pub(super) ctx: RunContext,
    pub(super) scheduler: Scheduler,
    pub(super) outputs: OutputStore,
    pub(super) services: EngineServices,
    pub(super) in_flight: HashMap<TaskName, InFlight>,
    pub(super) failures: BTreeMap<TaskName, String>,
}

impl CoreRuntime {
    pub fn new(
        spec: Arc<PipelineSpec>,
        graph: TaskGraph,
        ctx: RunContext,
        services: EngineServices,
    ) -> Self {
        let scheduler = Scheduler::new(&spec, graph);
        Self {
            spec,
            ctx,
            scheduler,
            outputs: OutputStore::new(),
            services,
            in_flight: HashMap::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Core runtime for a compiled job under the given engine config.
    pub fn for_job(job: &CompiledJob, cfg: &EngineConfig, services: EngineServices) -> Self {
        Self::new(
            job.spec(),
            job.graph().clone(),
            RunContext::new(job, cfg),
            services,
        )
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Start the run: prepare every root task.
    pub fn start(&mut self) -> CoreStep {
        let step = self.scheduler.start();
        let commands = self.dispatch_ready(step.newly_scheduled);
        self.finish_step(commands)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, outcome } => {
                self.handle_task_completion(task, outcome)
            }
            RuntimeEvent::CancelRequested { task } => self.handle_cancel(task),
            RuntimeEvent::ShutdownRequested => self.handle_shutdown(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            job: self.ctx.job_name.clone(),
            pipeline: self.ctx.pipeline_name.clone(),
            states: self.scheduler.states(),
            failures: self.failures.clone(),
            outputs: self.outputs.snapshot(),
        }
    }
}
