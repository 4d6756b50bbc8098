// src/types.rs

use serde::Deserialize;

/// Where cache entries are kept between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageMode {
    /// JSON file at `[cache].path`; survives restarts.
    File,
    /// Process memory only.
    #[default]
    Memory,
}
