// src/config/mod.rs

//! Configuration and job loading.
//!
//! - `model.rs`: the TOML-backed engine config and the compiled job.
//! - `loader.rs`: reading engine config (TOML) and jobs (JSON) from disk.
//! - `validate.rs`: turning raw documents into validated ones.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_compile, load_engine_config, load_engine_config_or_default,
    load_job,
};
pub use model::{
    CacheSection, CompiledJob, EngineConfig, EngineSection, MetadataSection, RawEngineConfig,
};
