// src/dag/mod.rs

//! Task graph construction and per-run scheduling.
//!
//! - [`graph`] builds the validated task DAG from a pipeline spec.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and which are blocked by failures.
//! - [`task_info`] provides task run states and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{DependencyKind, TaskGraph};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{ScheduledTask, TaskRunState};
