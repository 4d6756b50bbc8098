// src/metadata/memory.rs

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::ir::RuntimeArtifact;
use crate::resolve::ArtifactFilter;

use super::{
    ArtifactState, ExecutionRecord, ExecutionState, MetadataStore, OutputEvent, StoredArtifact,
};

#[derive(Debug, Default)]
struct Inner {
    artifacts: Vec<StoredArtifact>,
    executions: Vec<(u64, ExecutionRecord)>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Process-local metadata store.
///
/// Cheap to clone; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact directly (seeding, tests). Returns its id.
    pub fn insert_artifact(
        &self,
        artifact: RuntimeArtifact,
        contexts: Vec<String>,
        state: ArtifactState,
    ) -> Result<u64> {
        let mut inner = self.lock()?;
        let id = inner.tick();
        inner.artifacts.push(StoredArtifact {
            id,
            artifact,
            state,
            contexts,
            create_time_since_epoch: id,
        });
        Ok(id)
    }

    /// Load seed artifacts from a JSON array of [`StoredArtifact`]s, keeping
    /// their order as registration order.
    pub fn load_seed(&self, fs: &dyn FileSystem, path: &Path) -> Result<usize> {
        let contents = fs.read_to_string(path)?;
        let seed: Vec<StoredArtifact> = serde_json::from_str(&contents)
            .with_context(|| format!("parsing metadata seed {:?}", path))?;
        let count = seed.len();
        for stored in seed {
            self.insert_artifact(stored.artifact, stored.contexts, stored.state)?;
        }
        info!(path = ?path, artifacts = count, "seeded metadata store");
        Ok(count)
    }

    pub fn artifacts(&self) -> Result<Vec<StoredArtifact>> {
        Ok(self.lock()?.artifacts.clone())
    }

    /// Recorded executions with their ids, in publication order.
    pub fn executions(&self) -> Result<Vec<(u64, ExecutionRecord)>> {
        Ok(self.lock()?.executions.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("metadata store lock poisoned"))
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn query_artifacts(&self, filter: &ArtifactFilter, limit: usize) -> Result<Vec<StoredArtifact>> {
        let inner = self.lock()?;
        let mut matches: Vec<StoredArtifact> = inner
            .artifacts
            .iter()
            .filter(|stored| filter.matches(stored))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.create_time_since_epoch
                .cmp(&a.create_time_since_epoch)
                .then(b.id.cmp(&a.id))
        });
        matches.truncate(limit);
        debug!(%filter, limit, found = matches.len(), "queried artifacts");
        Ok(matches)
    }

    fn put_execution(&self, mut record: ExecutionRecord) -> Result<u64> {
        let mut inner = self.lock()?;

        // A final record replaces the RUNNING record of the same invocation.
        let running = inner.executions.iter().position(|(_, e)| {
            e.state == ExecutionState::Running && e.run == record.run && e.task == record.task
        });
        let execution_id = match running {
            Some(pos) => {
                let (id, previous) = inner.executions.remove(pos);
                if record.inputs.is_empty() && record.input_parameters.is_empty() {
                    record.inputs = previous.inputs;
                    record.input_parameters = previous.input_parameters;
                }
                id
            }
            None => inner.tick(),
        };

        let publishes = record.output_event == OutputEvent::Output
            && matches!(record.state, ExecutionState::Complete | ExecutionState::Cached);

        if publishes {
            for artifact in record.outputs.values().flatten() {
                let existing = inner.artifacts.iter().position(|stored| {
                    stored.artifact.uri == artifact.uri
                        && stored.artifact.artifact_type == artifact.artifact_type
                });
                match existing {
                    Some(pos) => {
                        let stored = &mut inner.artifacts[pos];
                        stored.state = ArtifactState::Live;
                        if !stored.contexts.contains(&record.context) {
                            stored.contexts.push(record.context.clone());
                        }
                    }
                    None => {
                        let id = inner.tick();
                        inner.artifacts.push(StoredArtifact {
                            id,
                            artifact: artifact.clone(),
                            state: ArtifactState::Live,
                            contexts: vec![record.context.clone()],
                            create_time_since_epoch: id,
                        });
                    }
                }
            }
        }

        debug!(
            task = %record.task,
            state = ?record.state,
            execution_id,
            published = publishes,
            "recorded execution"
        );
        inner.executions.push((execution_id, record));
        Ok(execution_id)
    }
}
