// src/ir/artifact.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Type schema of an artifact: either a well-known schema title
/// (e.g. `system.Dataset`) or an inline instance schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactTypeSchema {
    SchemaTitle(String),
    InstanceSchema(String),
}

impl ArtifactTypeSchema {
    /// String used to compare types in queries and merge checks.
    pub fn identity(&self) -> &str {
        match self {
            ArtifactTypeSchema::SchemaTitle(s) | ArtifactTypeSchema::InstanceSchema(s) => s,
        }
    }
}

impl fmt::Display for ArtifactTypeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identity())
    }
}

/// A concrete artifact flowing between tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeArtifact {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactTypeSchema,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, Value>,
}

impl RuntimeArtifact {
    pub fn new(name: impl Into<String>, artifact_type: ArtifactTypeSchema, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_type,
            uri: uri.into(),
            properties: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
        }
    }
}
