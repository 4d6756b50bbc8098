// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::model::{CompiledJob, EngineConfig, RawEngineConfig};
use crate::errors::Result;
use crate::ir::RawPipelineJob;

/// Read and validate an engine config file (TOML).
pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: RawEngineConfig = toml::from_str(&contents)?;
    let cfg = EngineConfig::try_from(raw)?;
    debug!(path = ?path, "loaded engine config");
    Ok(cfg)
}

/// Load `path` if given; otherwise [`default_config_path`] if that file
/// exists; otherwise built-in defaults.
pub fn load_engine_config_or_default(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => load_engine_config(path),
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_engine_config(&default)
            } else {
                debug!("no engine config file; using defaults");
                Ok(EngineConfig::default())
            }
        }
    }
}

/// Read a pipeline job document (JSON). Not validated.
pub fn load_job(path: impl AsRef<Path>) -> Result<RawPipelineJob> {
    let contents = fs::read_to_string(path.as_ref())?;
    let job: RawPipelineJob = serde_json::from_str(&contents)?;
    Ok(job)
}

/// Read a pipeline job and compile it: the recommended entry point.
pub fn load_and_compile(path: impl AsRef<Path>) -> Result<CompiledJob> {
    let raw = load_job(&path)?;
    let job = CompiledJob::try_from(raw)?;
    info!(job = %job.name(), tasks = job.graph().len(), "job compiled");
    Ok(job)
}

/// `Dagspec.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Dagspec.toml")
}
