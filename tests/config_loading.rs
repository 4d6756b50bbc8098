mod common;

use std::sync::Arc;

use clap::Parser;
use common::builders::{ContainerBuilder, PipelineJobBuilder, TaskBuilder};
use dagspec::cli::CliArgs;
use dagspec::config::{load_and_compile, load_engine_config, load_job};
use dagspec::errors::EngineError;
use dagspec::fs::RealFileSystem;
use dagspec::ir::{PrimitiveType, Value};
use dagspec::metadata::MetadataStore;
use dagspec::resolve::ArtifactFilter;
use dagspec::types::CacheStorageMode;
use tempfile::tempdir;

#[test]
fn engine_config_sections_are_read() {
    common::init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("Dagspec.toml");
    std::fs::write(
        &path,
        r#"
[engine]
output_root = "gs://bucket/out"
max_parallel = 2

[cache]
storage = "file"
path = "cache.json"
"#,
    )
    .unwrap();

    let cfg = load_engine_config(&path).unwrap();
    assert_eq!(cfg.engine.output_root, "gs://bucket/out");
    assert_eq!(cfg.engine.max_parallel, 2);
    assert!(cfg.cache.enabled);
    assert_eq!(cfg.cache.storage, CacheStorageMode::File);
    assert!(cfg.metadata.seed.is_none());
}

#[test]
fn zero_parallelism_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Dagspec.toml");
    std::fs::write(&path, "[engine]\nmax_parallel = 0\n").unwrap();

    assert!(matches!(
        load_engine_config(&path),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn malformed_toml_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Dagspec.toml");
    std::fs::write(&path, "[engine\n").unwrap();

    assert!(matches!(load_engine_config(&path), Err(EngineError::Toml(_))));
}

#[test]
fn hand_written_job_document_compiles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("job.json");
    std::fs::write(
        &path,
        r#"{
  "name": "nightly-1",
  "pipeline_spec": {
    "pipeline_info": { "name": "train" },
    "runtime_parameters": {
      "epochs": { "type": "INT", "default_value": { "int_value": 5 } }
    },
    "deployment_config": {
      "executors": {
        "exec-a": { "container": { "image": "alpine", "command": ["echo"], "args": ["{{$.inputs.parameters['e']}}"] } }
      }
    },
    "tasks": [
      {
        "name": "a",
        "executor_label": "exec-a",
        "inputs": { "parameters": { "e": { "runtime_value": { "runtime_parameter": "epochs" } } } },
        "outputs": { "parameters": { "loss": { "type": "DOUBLE" } } }
      },
      {
        "name": "b",
        "executor_label": "exec-a",
        "inputs": {
          "parameters": {
            "e": { "task_output_parameter": { "producer_task": "a", "output_parameter_key": "loss" } }
          }
        }
      }
    ]
  },
  "labels": { "team": "ml" },
  "runtime_config": { "parameters": { "epochs": { "int_value": 3 } } }
}"#,
    )
    .unwrap();

    let job = load_and_compile(&path).unwrap();
    assert_eq!(job.name(), "nightly-1");
    assert_eq!(job.spec().pipeline_info.name, "train");
    assert_eq!(job.graph().topological_order(), &["a", "b"]);
    assert_eq!(job.runtime_parameters()["epochs"], Value::Int(3));
    assert_eq!(job.labels()["team"], "ml");
}

#[test]
fn builder_job_round_trips_through_json() {
    let raw = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", ContainerBuilder::new("alpine").command(&["run"]).build())
        .with_runtime_parameter("lr", PrimitiveType::Double, Some(Value::Double(0.1)))
        .with_task(
            TaskBuilder::new("a", "exec")
                .param_runtime("lr", "lr")
                .output_artifact("model", "system.Model")
                .cache(true)
                .build(),
        )
        .build_raw();

    let dir = tempdir().unwrap();
    let path = dir.path().join("job.json");
    std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    let loaded = load_job(&path).unwrap();
    assert_eq!(loaded.name, "job");
    assert!(loaded.pipeline_spec.tasks[0].caching_options.enable_cache);
    assert!(load_and_compile(&path).is_ok());
}

#[test]
fn seeded_metadata_is_available_to_services() {
    let dir = tempdir().unwrap();
    let seed = dir.path().join("seed.json");
    std::fs::write(
        &seed,
        r#"[
  { "artifact": { "type": { "schema_title": "system.Model" }, "uri": "gs://m/1" }, "contexts": ["pipe"] },
  { "artifact": { "type": { "schema_title": "system.Model" }, "uri": "gs://m/2" }, "contexts": ["pipe"] }
]"#,
    )
    .unwrap();

    let mut cfg = dagspec::config::EngineConfig::default();
    cfg.metadata.seed = Some(seed);
    cfg.cache.enabled = false;

    let services = dagspec::build_services(&cfg, Arc::new(RealFileSystem)).unwrap();
    assert!(services.cache.is_none());

    let filter: ArtifactFilter = "uri = 'gs://m/2'".parse().unwrap();
    let found = services.metadata.query_artifacts(&filter, 5).unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn cli_parses_run_flags() {
    let args = CliArgs::try_parse_from([
        "dagspec",
        "--job",
        "job.json",
        "--dry-run",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert_eq!(args.job, std::path::PathBuf::from("job.json"));
    assert!(args.dry_run);
    assert!(args.config.is_none());
    assert!(args.log_level.is_some());
}
