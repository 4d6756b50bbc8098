// src/engine/mod.rs

//! Orchestration engine for dagspec.
//!
//! This module ties together:
//! - the DAG scheduler
//! - task preparation (resolve, fingerprint, cache check, substitute) in
//!   [`dispatch`]
//! - output ingestion and publishing on completion
//! - the main runtime event loop that reacts to:
//!   - task completion events from the executor
//!   - cancellation requests
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Outputs were taken from the cache instead of executing.
    Cached,
    /// Failed with the given exit code (`-1` when there is none).
    Failed(i32),
}

/// Events flowing into the runtime from executors, signals, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched container invocation finished.
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// Cancel a task (pending or running).
    CancelRequested { task: TaskName },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod dispatch;
pub mod event_handlers;
pub mod runtime;
pub mod summary;

pub use core::{CoreRuntime, EngineServices};
pub use dispatch::{NoopPreCacheCheck, PreCacheCheck, Prepared};
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
pub use summary::RunSummary;
