// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod ir;
pub mod logging;
pub mod metadata;
pub mod outputs;
pub mod resolve;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use crate::cli::CliArgs;
use crate::config::{CompiledJob, EngineConfig, load_and_compile, load_engine_config_or_default};
use crate::dag::DependencyKind;
use crate::engine::{CoreRuntime, EngineServices, RunSummary, Runtime, RuntimeEvent};
use crate::exec::{LocalPreCacheCheck, LocalProcessBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::ir::ExecutorSpec;
use crate::metadata::InMemoryMetadataStore;
use crate::outputs::write_outputs;
use crate::resolve::RunContext;
use crate::types::CacheStorageMode;

/// High-level entry point used by `main.rs`.
///
/// Loads the engine config and the job, then either prints the plan
/// (`--dry-run`, returns `None`) or runs the pipeline with local processes
/// and returns its summary.
pub async fn run(args: CliArgs) -> Result<Option<RunSummary>> {
    let cfg = load_engine_config_or_default(args.config.as_deref())?;
    let job = load_and_compile(&args.job)
        .with_context(|| format!("loading job {:?}", args.job))?;

    if args.dry_run {
        print_dry_run(&job, &cfg);
        return Ok(None);
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let services = build_services(&cfg, Arc::clone(&fs))?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = LocalProcessBackend::new(rt_tx.clone(), cfg.engine.max_parallel);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let core = CoreRuntime::for_job(&job, &cfg, services);
    let summary = Runtime::new(core, rt_rx, executor).run().await?;

    if let Some(path) = &args.outputs {
        write_outputs(fs.as_ref(), path, &summary.outputs)?;
    }

    print_summary(&summary);
    Ok(Some(summary))
}

/// Collaborators for a run as configured: metadata store (optionally
/// seeded), cache store and the local `pre_cache_check` hook runner.
pub fn build_services(cfg: &EngineConfig, fs: Arc<dyn FileSystem>) -> Result<EngineServices> {
    let metadata = InMemoryMetadataStore::new();
    if let Some(seed) = &cfg.metadata.seed {
        metadata.load_seed(fs.as_ref(), seed)?;
    }

    let mut services = EngineServices::new(Arc::clone(&fs), Arc::new(metadata))
        .with_pre_cache_check(Arc::new(LocalPreCacheCheck::new(Arc::clone(&fs))));
    if cfg.cache.enabled {
        let cache: Box<dyn CacheStore> = match cfg.cache.storage {
            CacheStorageMode::Memory => Box::new(MemoryCacheStore::new()),
            CacheStorageMode::File => Box::new(FileCacheStore::new(fs, cfg.cache.path.clone())),
        };
        services = services.with_cache(cache);
    } else {
        debug!("cache disabled by config");
    }
    Ok(services)
}

/// Print the topological plan: tasks, executors, dependencies.
fn print_dry_run(job: &CompiledJob, cfg: &EngineConfig) {
    let spec = job.spec();
    let ctx = RunContext::new(job, cfg);

    println!("dagspec dry-run");
    println!("  job = {}", job.name());
    println!("  pipeline = {}", spec.pipeline_info.name);
    println!("  output_root = {}", ctx.layout.output_root());
    println!();

    println!("tasks ({}), in execution order:", job.graph().len());
    for name in job.graph().topological_order() {
        let Some(task) = spec.task(name) else {
            continue;
        };
        let kind = spec
            .executor_for(task)
            .map(ExecutorSpec::kind)
            .unwrap_or("unknown");
        println!("  - {name} ({kind}: {})", task.executor_label);
        for (producer, kind) in job.graph().incoming_edges(name) {
            match kind {
                DependencyKind::Parameter { input_key, output_key } => {
                    println!("      param {input_key} <- {producer}.{output_key}");
                }
                DependencyKind::Artifact { input_key, output_key } => {
                    println!("      artifact {input_key} <- {producer}.{output_key}");
                }
                DependencyKind::Control => println!("      after {producer}"),
            }
        }
        if task.caching_options.enable_cache {
            println!("      cache: enabled");
        }
        if let Some(ExecutorSpec::Container(c)) = spec.executor_for(task) {
            println!("      image: {}", c.image);
            let argv: Vec<&String> = c.command.iter().chain(&c.args).collect();
            println!("      argv: {:?}", argv);
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(summary: &RunSummary) {
    println!(
        "job {} {}",
        summary.job,
        if summary.succeeded() { "succeeded" } else { "failed" }
    );
    for (task, state) in &summary.states {
        match summary.failures.get(task) {
            Some(reason) => println!("  {task}: {state} ({reason})"),
            None => println!("  {task}: {state}"),
        }
    }
}
