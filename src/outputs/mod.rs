// src/outputs/mod.rs

pub mod ingest;
pub mod publish;
pub mod store;

pub use ingest::{ingest_container_outputs, synthesize_importer_outputs};
pub use publish::{
    publish_cached_execution, publish_canceled_execution, publish_failed_execution,
    publish_internal_execution, publish_running_execution, publish_succeeded_execution,
};
pub use store::{OutputStore, TaskOutputs, write_outputs};
