// src/resolve/mod.rs

//! Turning a task declaration into a concrete invocation.
//!
//! - [`context`] carries the explicit run context and the deterministic
//!   output-location scheme.
//! - [`inputs`] resolves parameter and artifact references.
//! - [`placeholder`] expands `{{$...}}` templates against an `ExecutorInput`.
//! - [`query`] parses and evaluates resolver artifact filters.

pub mod context;
pub mod inputs;
pub mod placeholder;
pub mod query;

pub use context::{OutputLayout, RunContext};
pub use inputs::{ResolvedInputs, build_executor_input, resolve_task_inputs, resolve_value};
pub use placeholder::{Placeholder, expand, expand_all};
pub use query::{ArtifactFilter, FilterField, FilterLiteral, evaluate_resolver};
