// src/engine/dispatch.rs

//! Preparing one scheduled task: resolve its inputs, run the pre-cache-check
//! hook, consult the cache, then either substitute the container command line
//! or execute importer/resolver tasks in-process.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStore, compute_fingerprint};
use crate::errors::{EngineError, Result};
use crate::exec::ContainerInvocation;
use crate::fs::FileSystem;
use crate::ir::{ExecutorInput, ExecutorSpec, PipelineContainerSpec, PipelineSpec, PipelineTaskSpec};
use crate::metadata::MetadataStore;
use crate::outputs::{
    OutputStore, TaskOutputs, publish_cached_execution, publish_internal_execution,
    publish_running_execution, publish_succeeded_execution, synthesize_importer_outputs,
};
use crate::resolve::{
    RunContext, build_executor_input, evaluate_resolver, expand_all, resolve_task_inputs,
};

use super::TaskOutcome;

/// The `pre_cache_check` lifecycle hook of container tasks.
///
/// Receives the substituted hook command line and the executor input; the
/// returned input (possibly with rewritten input artifact properties) is the
/// one fingerprinted and dispatched.
pub trait PreCacheCheck: Send + Sync + Debug {
    fn run(&self, task: &str, argv: &[String], input: ExecutorInput) -> anyhow::Result<ExecutorInput>;
}

/// Hook that leaves the input untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreCacheCheck;

impl PreCacheCheck for NoopPreCacheCheck {
    fn run(&self, task: &str, argv: &[String], input: ExecutorInput) -> anyhow::Result<ExecutorInput> {
        debug!(task = %task, ?argv, "pre_cache_check hook (no-op)");
        Ok(input)
    }
}

/// Collaborators the engine talks to while a run progresses.
#[derive(Debug)]
pub struct EngineServices {
    pub fs: Arc<dyn FileSystem>,
    pub metadata: Arc<dyn MetadataStore>,
    /// `None` disables caching for every task.
    pub cache: Option<Box<dyn CacheStore>>,
    pub pre_cache_check: Arc<dyn PreCacheCheck>,
}

impl EngineServices {
    pub fn new(fs: Arc<dyn FileSystem>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            fs,
            metadata,
            cache: None,
            pre_cache_check: Arc::new(NoopPreCacheCheck),
        }
    }

    pub fn with_cache(mut self, cache: Box<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_pre_cache_check(mut self, hook: Arc<dyn PreCacheCheck>) -> Self {
        self.pre_cache_check = hook;
        self
    }
}

/// Result of preparing a task.
#[derive(Debug)]
pub enum Prepared {
    /// Hand the invocation to the executor backend.
    Container {
        invocation: ContainerInvocation,
        fingerprint: Option<String>,
    },
    /// Finished without the backend: importer, resolver or cache hit.
    Completed {
        outputs: TaskOutputs,
        outcome: TaskOutcome,
    },
}

/// Read-only view of the run used while preparing tasks.
pub struct DispatchContext<'a> {
    pub spec: &'a PipelineSpec,
    pub ctx: &'a RunContext,
    pub outputs: &'a OutputStore,
    pub services: &'a EngineServices,
}

pub fn prepare_task(name: &str, dc: &DispatchContext<'_>) -> Result<Prepared> {
    let task = dc
        .spec
        .task(name)
        .ok_or_else(|| EngineError::InvalidSpec(format!("unknown task '{name}'")))?;
    let executor = dc.spec.executor_for(task).ok_or_else(|| {
        EngineError::InvalidSpec(format!(
            "task '{name}': executor '{}' is not defined",
            task.executor_label
        ))
    })?;

    match executor {
        ExecutorSpec::Container(container) => prepare_container(task, container, dc),
        ExecutorSpec::Importer(importer) => {
            let outputs = synthesize_importer_outputs(
                task,
                importer,
                dc.spec,
                dc.ctx,
                dc.services.metadata.as_ref(),
            )?;
            publish_succeeded_execution(dc.services.metadata.as_ref(), dc.ctx, name, None, &outputs)?;
            Ok(Prepared::Completed {
                outputs,
                outcome: TaskOutcome::Success,
            })
        }
        ExecutorSpec::Resolver(resolver) => {
            let outputs =
                evaluate_resolver(name, resolver, dc.ctx, dc.services.metadata.as_ref())?;
            publish_internal_execution(dc.services.metadata.as_ref(), dc.ctx, name, &outputs)?;
            Ok(Prepared::Completed {
                outputs,
                outcome: TaskOutcome::Success,
            })
        }
    }
}

fn prepare_container(
    task: &PipelineTaskSpec,
    container: &PipelineContainerSpec,
    dc: &DispatchContext<'_>,
) -> Result<Prepared> {
    let resolved = resolve_task_inputs(task, dc.spec, dc.ctx, dc.outputs)?;
    let mut input = build_executor_input(task, dc.spec, dc.ctx, &resolved)?;

    if let Some(hook) = container
        .lifecycle
        .as_ref()
        .and_then(|l| l.pre_cache_check.as_ref())
    {
        let mut argv = expand_all(&hook.command, &input, &task.name)?;
        argv.extend(expand_all(&hook.args, &input, &task.name)?);
        input = dc.services.pre_cache_check.run(&task.name, &argv, input)?;
    }

    let fingerprint = match &dc.services.cache {
        Some(cache) if task.caching_options.enable_cache => {
            let fingerprint = compute_fingerprint(task, container, &input)?;
            if let Some(outputs) = lookup_cache(cache.as_ref(), dc.ctx, &task.name, &fingerprint)? {
                publish_cached_execution(
                    dc.services.metadata.as_ref(),
                    dc.ctx,
                    &task.name,
                    &fingerprint,
                    &input,
                    &outputs,
                )?;
                return Ok(Prepared::Completed {
                    outputs,
                    outcome: TaskOutcome::Cached,
                });
            }
            Some(fingerprint)
        }
        _ => None,
    };

    remove_stale_outputs(dc.services.fs.as_ref(), &input)?;

    let command = expand_all(&container.command, &input, &task.name)?;
    let args = expand_all(&container.args, &input, &task.name)?;

    publish_running_execution(
        dc.services.metadata.as_ref(),
        dc.ctx,
        &task.name,
        fingerprint.as_deref(),
        &input,
    )?;

    Ok(Prepared::Container {
        invocation: ContainerInvocation {
            task: task.name.clone(),
            image: container.image.clone(),
            command,
            args,
            executor_input: input,
        },
        fingerprint,
    })
}

fn lookup_cache(
    cache: &dyn CacheStore,
    ctx: &RunContext,
    task: &str,
    fingerprint: &str,
) -> Result<Option<TaskOutputs>> {
    let key = CacheKey {
        context: ctx.pipeline_name.clone(),
        task: task.to_string(),
        fingerprint: fingerprint.to_string(),
    };
    let hit = cache.lookup(&key)?;
    if hit.is_some() {
        info!(task = %task, key = %key, "cache hit; reusing recorded outputs");
    } else {
        debug!(task = %task, key = %key, "cache miss");
    }
    Ok(hit)
}

/// Output files left by an earlier attempt would be ingested as this
/// attempt's outputs.
fn remove_stale_outputs(fs: &dyn FileSystem, input: &ExecutorInput) -> Result<()> {
    for location in input.outputs.parameters.values() {
        fs.remove_file(std::path::Path::new(&location.output_file))?;
    }
    if !input.outputs.output_file.is_empty() {
        fs.remove_file(std::path::Path::new(&input.outputs.output_file))?;
    }
    Ok(())
}
