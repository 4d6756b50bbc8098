// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Cycle or dangling reference in the task graph. Fails compilation.
    #[error("graph integrity error in task '{task}': {reason}")]
    GraphIntegrity { task: TaskName, reason: String },

    /// A runtime parameter has neither a job-supplied value nor a default.
    #[error("task '{task}': runtime parameter '{parameter}' has no supplied value and no default")]
    MissingParameter { task: TaskName, parameter: String },

    /// An upstream output is not (yet) recorded.
    #[error("task '{task}': unresolved dependency {reference}")]
    UnresolvedDependency { task: TaskName, reference: String },

    #[error("task '{task}': cannot resolve placeholder '{placeholder}': {reason}")]
    PlaceholderResolution {
        task: TaskName,
        placeholder: String,
        reason: String,
    },

    #[error("task '{task}': no artifact found for output '{output_key}' (filter: {filter})")]
    ArtifactNotFound {
        task: TaskName,
        output_key: String,
        filter: String,
    },

    #[error("task '{task}': invalid artifact filter '{filter}': {reason}")]
    InvalidFilter {
        task: TaskName,
        filter: String,
        reason: String,
    },

    #[error("task '{task}': cannot parse output '{output_key}': {reason}")]
    OutputParsing {
        task: TaskName,
        output_key: String,
        reason: String,
    },

    #[error("invalid pipeline spec: {0}")]
    InvalidSpec(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Identity of the task the error belongs to, if it is task-scoped.
    pub fn task(&self) -> Option<&str> {
        match self {
            EngineError::GraphIntegrity { task, .. }
            | EngineError::MissingParameter { task, .. }
            | EngineError::UnresolvedDependency { task, .. }
            | EngineError::PlaceholderResolution { task, .. }
            | EngineError::ArtifactNotFound { task, .. }
            | EngineError::InvalidFilter { task, .. }
            | EngineError::OutputParsing { task, .. } => Some(task),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
