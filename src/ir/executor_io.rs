// src/ir/executor_io.rs

//! The per-invocation contract between the engine and an executor.
//!
//! An [`ExecutorInput`] is built fresh for every dispatch; an
//! [`ExecutorOutput`] is the only way a container reports values back. Neither
//! is persisted as pipeline state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::artifact::RuntimeArtifact;
use super::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactList {
    #[serde(default)]
    pub artifacts: Vec<RuntimeArtifact>,
}

impl ArtifactList {
    pub fn first(&self) -> Option<&RuntimeArtifact> {
        self.artifacts.first()
    }
}

impl From<Vec<RuntimeArtifact>> for ArtifactList {
    fn from(artifacts: Vec<RuntimeArtifact>) -> Self {
        Self { artifacts }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInput {
    pub inputs: Inputs,
    pub outputs: Outputs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inputs {
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub parameters: BTreeMap<String, OutputParameter>,
    /// Engine-allocated output artifact skeletons.
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactList>,
    /// Where the consolidated `ExecutorOutput` JSON may be written.
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParameter {
    pub output_file: String,
}

/// What an executor reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactList>,
}
