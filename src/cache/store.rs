// src/cache/store.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::outputs::TaskOutputs;

use super::CacheKey;

/// Maps cache keys to the outputs of the execution that produced them.
pub trait CacheStore: Send + Sync + Debug {
    fn lookup(&self, key: &CacheKey) -> Result<Option<TaskOutputs>>;
    fn save(&mut self, key: &CacheKey, outputs: &TaskOutputs) -> Result<()>;
}

/// Process-local cache, gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: HashMap<CacheKey, TaskOutputs>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn lookup(&self, key: &CacheKey) -> Result<Option<TaskOutputs>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &CacheKey, outputs: &TaskOutputs) -> Result<()> {
        self.entries.insert(key.clone(), outputs.clone());
        debug!(key = %key, "stored cache entry (memory)");
        Ok(())
    }
}

/// Cache persisted as one JSON document keyed by `context/task/fingerprint`.
#[derive(Debug)]
pub struct FileCacheStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    fn load_all(&self) -> Result<BTreeMap<String, TaskOutputs>> {
        if !self.fs.is_file(&self.path) {
            return Ok(BTreeMap::new());
        }
        let contents = self.fs.read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing cache file {:?}", self.path))
    }
}

impl CacheStore for FileCacheStore {
    fn lookup(&self, key: &CacheKey) -> Result<Option<TaskOutputs>> {
        let mut all = self.load_all()?;
        Ok(all.remove(&key.to_string()))
    }

    fn save(&mut self, key: &CacheKey, outputs: &TaskOutputs) -> Result<()> {
        let mut all = self.load_all()?;
        all.insert(key.to_string(), outputs.clone());
        let json = serde_json::to_vec_pretty(&all).context("serializing cache entries")?;
        self.fs.write(&self.path, &json)?;
        info!(key = %key, path = ?self.path, "stored cache entry (file)");
        Ok(())
    }
}
