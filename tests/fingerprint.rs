mod common;

use std::sync::Arc;

use common::builders::{ContainerBuilder, PipelineJobBuilder, TaskBuilder, test_engine_config};
use dagspec::cache::compute_fingerprint;
use dagspec::config::CompiledJob;
use dagspec::ir::{ArtifactTypeSchema, ExecutorSpec, PrimitiveType, RuntimeArtifact, Value};
use dagspec::outputs::{OutputStore, TaskOutputs};
use dagspec::resolve::{RunContext, build_executor_input, resolve_task_inputs};

fn job(job_name: &str, image: &str, lr: f64) -> CompiledJob {
    PipelineJobBuilder::new(job_name, "pipe")
        .with_executor(
            "train",
            ContainerBuilder::new(image)
                .command(&["python", "train.py"])
                .args(&[
                    "--lr",
                    "{{$.inputs.parameters['lr']}}",
                    "--out",
                    "{{$.outputs.parameters['loss'].output_file}}",
                    "--model",
                    "{{$.outputs.artifacts['model'].uri}}",
                ])
                .build(),
        )
        .with_task(
            TaskBuilder::new("train", "train")
                .param_constant("lr", Value::Double(lr))
                .output_param("loss", PrimitiveType::Double)
                .output_artifact("model", "system.Model")
                .cache(true)
                .build(),
        )
        .build()
}

fn fingerprint_of(job: &CompiledJob) -> String {
    let ctx = RunContext::new(job, &test_engine_config());
    let spec = job.spec();
    let task = spec.task("train").unwrap();
    let ExecutorSpec::Container(container) = spec.executor_for(task).unwrap() else {
        panic!("expected a container executor");
    };
    let resolved = resolve_task_inputs(task, &spec, &ctx, &OutputStore::new()).unwrap();
    let input = build_executor_input(task, &spec, &ctx, &resolved).unwrap();
    compute_fingerprint(task, container, &input).unwrap()
}

#[test]
fn identical_work_in_another_run_has_the_same_fingerprint() {
    common::init_tracing();

    let first = fingerprint_of(&job("run-1", "trainer:1", 0.1));
    let second = fingerprint_of(&job("run-2", "trainer:1", 0.1));
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
}

#[test]
fn fingerprint_changes_with_input_parameter() {
    let base = fingerprint_of(&job("run", "trainer:1", 0.1));
    let changed = fingerprint_of(&job("run", "trainer:1", 0.2));
    assert_ne!(base, changed);
}

#[test]
fn fingerprint_changes_with_image() {
    let base = fingerprint_of(&job("run", "trainer:1", 0.1));
    let changed = fingerprint_of(&job("run", "trainer:2", 0.1));
    assert_ne!(base, changed);
}

#[test]
fn fingerprint_changes_with_output_signature() {
    let base = fingerprint_of(&job("run", "trainer:1", 0.1));

    let raw = job("run", "trainer:1", 0.1);
    let mut spec = (*raw.spec()).clone();
    spec.tasks[0]
        .outputs
        .parameters
        .get_mut("loss")
        .unwrap()
        .parameter_type = PrimitiveType::String;
    let rebuilt = PipelineJobBuilder::new("run", "pipe");
    let mut rebuilt = rebuilt.build_raw();
    rebuilt.pipeline_spec = spec;
    let changed = fingerprint_of(&CompiledJob::try_from(rebuilt).unwrap());

    assert_ne!(base, changed);
}

/// `score` reads the `model` artifact of an upstream `train` task.
fn scoring_job(executor_label: &str) -> CompiledJob {
    PipelineJobBuilder::new("run", "pipe")
        .with_executor(
            executor_label,
            ContainerBuilder::new("scorer:1")
                .command(&["score"])
                .args(&["--model", "{{$.inputs.artifacts['model'].uri}}"])
                .build(),
        )
        .with_executor("train", ContainerBuilder::new("trainer:1").command(&["train"]).build())
        .with_task(
            TaskBuilder::new("train", "train")
                .output_artifact("model", "system.Model")
                .build(),
        )
        .with_task(
            TaskBuilder::new("score", executor_label)
                .artifact_from_task("model", "train", "model")
                .cache(true)
                .build(),
        )
        .build()
}

fn model(uri: &str, schema_title: &str, rows: i64) -> RuntimeArtifact {
    let mut artifact = RuntimeArtifact::new(
        "train.model",
        ArtifactTypeSchema::SchemaTitle(schema_title.into()),
        uri,
    );
    artifact.properties.insert("rows".into(), Value::Int(rows));
    artifact
}

fn scoring_fingerprint(job: &CompiledJob, upstream: RuntimeArtifact) -> String {
    let ctx = RunContext::new(job, &test_engine_config());
    let spec = job.spec();
    let task = spec.task("score").unwrap();
    let ExecutorSpec::Container(container) = spec.executor_for(task).unwrap() else {
        panic!("expected a container executor");
    };
    let mut recorded = TaskOutputs::default();
    recorded
        .artifacts
        .insert("model".into(), vec![Arc::new(upstream)]);
    let mut outputs = OutputStore::new();
    outputs.record("train", recorded);

    let resolved = resolve_task_inputs(task, &spec, &ctx, &outputs).unwrap();
    let input = build_executor_input(task, &spec, &ctx, &resolved).unwrap();
    compute_fingerprint(task, container, &input).unwrap()
}

#[test]
fn fingerprint_changes_with_input_artifact_uri() {
    let job = scoring_job("score");
    let base = scoring_fingerprint(&job, model("gs://m/1", "system.Model", 10));
    let same = scoring_fingerprint(&job, model("gs://m/1", "system.Model", 10));
    let changed = scoring_fingerprint(&job, model("gs://m/2", "system.Model", 10));
    assert_eq!(base, same);
    assert_ne!(base, changed);
}

#[test]
fn fingerprint_changes_with_input_artifact_property() {
    let job = scoring_job("score");
    let base = scoring_fingerprint(&job, model("gs://m/1", "system.Model", 10));
    let changed = scoring_fingerprint(&job, model("gs://m/1", "system.Model", 11));
    assert_ne!(base, changed);
}

#[test]
fn fingerprint_changes_with_input_artifact_type() {
    let job = scoring_job("score");
    let base = scoring_fingerprint(&job, model("gs://m/1", "system.Model", 10));
    let changed = scoring_fingerprint(&job, model("gs://m/1", "system.Dataset", 10));
    assert_ne!(base, changed);
}

#[test]
fn fingerprint_changes_with_executor_label() {
    let base = scoring_fingerprint(&scoring_job("score"), model("gs://m/1", "system.Model", 10));
    let changed = scoring_fingerprint(
        &scoring_job("score-v2"),
        model("gs://m/1", "system.Model", 10),
    );
    assert_ne!(base, changed);
}
