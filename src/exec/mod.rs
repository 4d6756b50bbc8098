// src/exec/mod.rs

//! Container execution layer.
//!
//! - [`invocation`] is the substituted command line handed to a backend.
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `LocalProcessBackend`.
//! - [`local`] owns the executor loop that runs local processes.
//! - [`pre_cache`] runs the `pre_cache_check` lifecycle hook.

pub mod backend;
pub mod invocation;
pub mod local;
pub mod pre_cache;

pub use backend::{BackendFuture, ExecutorBackend, LocalProcessBackend};
pub use invocation::ContainerInvocation;
pub use pre_cache::LocalPreCacheCheck;
