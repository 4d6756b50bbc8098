// src/metadata/mod.rs

//! Metadata store collaborator.
//!
//! Resolver tasks query historical artifacts through [`MetadataStore`], and
//! every task execution is published into it (see
//! [`crate::outputs::publish`]). The engine never depends on a concrete
//! store; [`memory::InMemoryMetadataStore`] is the implementation used by the
//! CLI and by tests.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::engine::TaskName;
use crate::ir::{RuntimeArtifact, Value};
use crate::resolve::ArtifactFilter;

pub mod memory;

pub use memory::InMemoryMetadataStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactState {
    Pending,
    #[default]
    Live,
    MarkedForDeletion,
    Deleted,
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactState::Pending => "PENDING",
            ArtifactState::Live => "LIVE",
            ArtifactState::MarkedForDeletion => "MARKED_FOR_DELETION",
            ArtifactState::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// An artifact as registered in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    #[serde(default)]
    pub id: u64,
    pub artifact: RuntimeArtifact,
    #[serde(default)]
    pub state: ArtifactState,
    /// Names of the contexts (pipelines) the artifact belongs to.
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Registration order; larger is more recent.
    #[serde(default)]
    pub create_time_since_epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Running,
    Complete,
    Cached,
    Failed,
    Canceled,
}

/// How an execution's outputs are linked to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputEvent {
    /// Outputs are produced by the execution and published as live
    /// artifacts of the context.
    Output,
    /// Outputs are pre-existing artifacts the execution merely selected.
    InternalOutput,
}

/// One task execution as published into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task: TaskName,
    /// Pipeline context name.
    pub context: String,
    /// Job (run) name.
    pub run: String,
    pub state: ExecutionState,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub output_event: OutputEvent,
    /// Input artifacts the execution consumed, by input key.
    #[serde(default)]
    pub inputs: BTreeMap<String, Vec<RuntimeArtifact>>,
    /// Resolved input parameter values the execution ran with.
    #[serde(default)]
    pub input_parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Vec<RuntimeArtifact>>,
}

/// Artifact/context store consumed by resolver and importer tasks.
pub trait MetadataStore: Send + Sync + Debug {
    /// Return artifacts matching `filter`, most recent first, at most
    /// `limit` of them.
    fn query_artifacts(&self, filter: &ArtifactFilter, limit: usize) -> Result<Vec<StoredArtifact>>;

    /// Record an execution. Outputs linked with [`OutputEvent::Output`] on a
    /// `Complete` or `Cached` execution become live artifacts of the
    /// record's context. A final record replacing a `Running` one keeps the
    /// inputs registered with it. Returns the execution id.
    fn put_execution(&self, record: ExecutionRecord) -> Result<u64>;
}
