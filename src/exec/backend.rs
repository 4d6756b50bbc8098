// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime hands substituted container invocations to an
//! `ExecutorBackend` and receives `TaskCompleted` events back on its event
//! channel. Tests swap in a fake backend that completes tasks directly.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{RuntimeEvent, TaskName};
use crate::errors::{EngineError, Result};

use super::invocation::ContainerInvocation;
use super::local::{ExecMessage, spawn_local_executor};

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// How container invocations are executed.
///
/// A backend reports each finished invocation as
/// [`RuntimeEvent::TaskCompleted`]. A canceled invocation must not report.
pub trait ExecutorBackend: Send {
    fn dispatch(&mut self, invocations: Vec<ContainerInvocation>) -> BackendFuture<'_>;

    fn cancel(&mut self, tasks: Vec<TaskName>) -> BackendFuture<'_>;
}

/// Runs invocations as local processes, at most `max_parallel` at a time.
pub struct LocalProcessBackend {
    tx: mpsc::Sender<ExecMessage>,
}

impl LocalProcessBackend {
    /// Spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, max_parallel: usize) -> Self {
        let tx = spawn_local_executor(runtime_tx, max_parallel);
        Self { tx }
    }
}

fn closed(e: impl std::fmt::Display) -> EngineError {
    EngineError::Other(anyhow::anyhow!("executor loop is gone: {e}"))
}

impl ExecutorBackend for LocalProcessBackend {
    fn dispatch(&mut self, invocations: Vec<ContainerInvocation>) -> BackendFuture<'_> {
        let tx = self.tx.clone();
        Box::pin(async move {
            for invocation in invocations {
                tx.send(ExecMessage::Run(invocation)).await.map_err(closed)?;
            }
            Ok(())
        })
    }

    fn cancel(&mut self, tasks: Vec<TaskName>) -> BackendFuture<'_> {
        let tx = self.tx.clone();
        Box::pin(async move {
            for task in tasks {
                tx.send(ExecMessage::Cancel(task)).await.map_err(closed)?;
            }
            Ok(())
        })
    }
}
