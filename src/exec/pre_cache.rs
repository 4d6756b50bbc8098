// src/exec/pre_cache.rs

//! The `pre_cache_check` hook as a local process.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::engine::PreCacheCheck;
use crate::fs::FileSystem;
use crate::ir::{ExecutorInput, ExecutorOutput};

/// Runs the substituted hook command line before the cache lookup.
///
/// The hook may write an `ExecutorOutput` document to
/// `{{$.outputs.output_file}}`. Each artifact entry in it updates the
/// properties of the input artifacts under the same key; the updated input
/// is the one fingerprinted and dispatched. A non-zero exit fails the task.
#[derive(Debug, Clone)]
pub struct LocalPreCacheCheck {
    fs: Arc<dyn FileSystem>,
}

impl LocalPreCacheCheck {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl PreCacheCheck for LocalPreCacheCheck {
    fn run(&self, task: &str, argv: &[String], mut input: ExecutorInput) -> Result<ExecutorInput> {
        let Some((program, rest)) = argv.split_first() else {
            bail!("task '{task}': pre_cache_check has an empty command line");
        };
        let doc_path = (!input.outputs.output_file.is_empty())
            .then(|| Path::new(&input.outputs.output_file).to_path_buf());
        if let Some(path) = &doc_path {
            self.fs.remove_file(path)?;
        }

        info!(task = %task, program = %program, "running pre_cache_check hook");
        let output = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning pre_cache_check for task '{task}'"))?;
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(task = %task, "pre_cache_check stderr: {}", line);
        }
        if !output.status.success() {
            bail!(
                "task '{task}': pre_cache_check exited with code {}",
                output.status.code().unwrap_or(-1)
            );
        }

        let Some(path) = doc_path.filter(|p| self.fs.is_file(p)) else {
            return Ok(input);
        };
        let contents = self.fs.read_to_string(&path)?;
        let doc: ExecutorOutput = serde_json::from_str(&contents)
            .with_context(|| format!("task '{task}': parsing pre_cache_check output {path:?}"))?;
        self.fs.remove_file(&path)?;

        apply_property_updates(task, &mut input, doc)?;
        Ok(input)
    }
}

fn apply_property_updates(task: &str, input: &mut ExecutorInput, doc: ExecutorOutput) -> Result<()> {
    if !doc.parameters.is_empty() {
        warn!(task = %task, "pre_cache_check reported parameters; ignoring them");
    }
    for (key, update) in doc.artifacts {
        let Some(current) = input.inputs.artifacts.get_mut(&key) else {
            bail!("task '{task}': pre_cache_check updated unknown input artifact '{key}'");
        };
        if update.artifacts.len() != current.artifacts.len() {
            bail!(
                "task '{task}': pre_cache_check returned {} artifacts for input '{key}', expected {}",
                update.artifacts.len(),
                current.artifacts.len()
            );
        }
        for (artifact, new) in current.artifacts.iter_mut().zip(update.artifacts) {
            if new.artifact_type != artifact.artifact_type {
                bail!(
                    "task '{task}': pre_cache_check changed the type of input '{key}' from {} to {}",
                    artifact.artifact_type,
                    new.artifact_type
                );
            }
            artifact.properties.extend(new.properties);
            artifact.custom_properties.extend(new.custom_properties);
        }
        debug!(task = %task, input = %key, "pre_cache_check updated input artifact properties");
    }
    Ok(())
}
