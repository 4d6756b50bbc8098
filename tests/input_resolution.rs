mod common;

use std::sync::Arc;

use common::builders::{ContainerBuilder, PipelineJobBuilder, TaskBuilder, test_engine_config};
use dagspec::errors::EngineError;
use dagspec::ir::{PrimitiveType, RuntimeArtifact, ArtifactTypeSchema, Value, ValueOrRuntimeParameter};
use dagspec::outputs::{OutputStore, TaskOutputs};
use dagspec::resolve::{
    RunContext, build_executor_input, expand_all, resolve_task_inputs, resolve_value,
};

fn container() -> dagspec::ir::ExecutorSpec {
    ContainerBuilder::new("alpine").command(&["true"]).build()
}

fn producer_outputs() -> TaskOutputs {
    let mut out = TaskOutputs::default();
    out.parameters.insert("count".into(), Value::Int(3));
    out.artifacts.insert(
        "dataset".into(),
        vec![Arc::new(RuntimeArtifact::new(
            "a.dataset",
            ArtifactTypeSchema::SchemaTitle("system.Dataset".into()),
            "mem://artifacts/job/a/dataset",
        ))],
    );
    out
}

fn two_task_job() -> dagspec::config::CompiledJob {
    PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_runtime_parameter("epochs", PrimitiveType::Int, Some(Value::Int(5)))
        .with_task(
            TaskBuilder::new("a", "exec")
                .output_param("count", PrimitiveType::Int)
                .output_artifact("dataset", "system.Dataset")
                .build(),
        )
        .with_task(
            TaskBuilder::new("b", "exec")
                .param_from_task("n", "a", "count")
                .param_runtime("epochs", "epochs")
                .param_constant("mode", Value::String("fast".into()))
                .artifact_from_task("data", "a", "dataset")
                .output_param("score", PrimitiveType::Double)
                .build(),
        )
        .build()
}

#[test]
fn resolves_all_input_kinds() {
    common::init_tracing();

    let job = two_task_job();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();
    let mut outputs = OutputStore::new();
    outputs.record("a", producer_outputs());

    let resolved = resolve_task_inputs(spec.task("b").unwrap(), &spec, &ctx, &outputs).unwrap();

    assert_eq!(resolved.parameters["n"], Value::Int(3));
    assert_eq!(resolved.parameters["epochs"], Value::Int(5));
    assert_eq!(resolved.parameters["mode"], Value::String("fast".into()));
    assert_eq!(resolved.artifacts["data"].len(), 1);
    assert_eq!(resolved.artifacts["data"][0].uri, "mem://artifacts/job/a/dataset");
}

#[test]
fn resolution_is_idempotent() {
    let job = two_task_job();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();
    let mut outputs = OutputStore::new();
    outputs.record("a", producer_outputs());
    let task = spec.task("b").unwrap();

    let first = resolve_task_inputs(task, &spec, &ctx, &outputs).unwrap();
    let second = resolve_task_inputs(task, &spec, &ctx, &outputs).unwrap();
    assert_eq!(first, second);

    let input_a = build_executor_input(task, &spec, &ctx, &first).unwrap();
    let input_b = build_executor_input(task, &spec, &ctx, &second).unwrap();
    assert_eq!(input_a, input_b);
}

#[test]
fn downstream_shares_the_producer_artifact() {
    let job = two_task_job();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();
    let mut outputs = OutputStore::new();
    let recorded = outputs.record("a", producer_outputs());

    let resolved = resolve_task_inputs(spec.task("b").unwrap(), &spec, &ctx, &outputs).unwrap();
    assert!(Arc::ptr_eq(
        &resolved.artifacts["data"][0],
        &recorded.artifacts["dataset"][0]
    ));
}

#[test]
fn supplied_runtime_parameter_beats_default() {
    let job = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_runtime_parameter("epochs", PrimitiveType::Int, Some(Value::Int(5)))
        .supply("epochs", Value::Int(9))
        .with_task(TaskBuilder::new("a", "exec").param_runtime("e", "epochs").build())
        .build();
    let ctx = RunContext::new(&job, &test_engine_config());

    let value = resolve_value(
        &ValueOrRuntimeParameter::RuntimeParameter("epochs".into()),
        "a",
        &job.spec(),
        &ctx,
    )
    .unwrap();
    assert_eq!(value, Value::Int(9));
}

#[test]
fn int_supplied_for_double_parameter_is_widened() {
    let job = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_runtime_parameter("lr", PrimitiveType::Double, None)
        .supply("lr", Value::Int(1))
        .with_task(TaskBuilder::new("a", "exec").param_runtime("lr", "lr").build())
        .build();

    assert_eq!(job.runtime_parameters()["lr"], Value::Double(1.0));
}

#[test]
fn parameter_without_value_or_default_is_missing() {
    let job = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_runtime_parameter("seed", PrimitiveType::Int, None)
        .with_task(TaskBuilder::new("a", "exec").param_runtime("s", "seed").build())
        .build();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();

    let err = resolve_task_inputs(spec.task("a").unwrap(), &spec, &ctx, &OutputStore::new())
        .unwrap_err();
    match err {
        EngineError::MissingParameter { task, parameter } => {
            assert_eq!(task, "a");
            assert_eq!(parameter, "seed");
        }
        other => panic!("expected MissingParameter, got {other:?}"),
    }
}

#[test]
fn unsupplied_upstream_is_an_unresolved_dependency() {
    let job = two_task_job();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();

    let err = resolve_task_inputs(spec.task("b").unwrap(), &spec, &ctx, &OutputStore::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::UnresolvedDependency { ref task, .. } if task == "b"));
}

#[test]
fn undeclared_runtime_parameter_reference_fails_compilation() {
    let raw = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_task(TaskBuilder::new("a", "exec").param_runtime("x", "nope").build())
        .build_raw();

    assert!(matches!(
        dagspec::config::CompiledJob::try_from(raw),
        Err(EngineError::InvalidSpec(_))
    ));
}

#[test]
fn unknown_supplied_parameter_is_dropped() {
    let job = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .supply("stray", Value::Int(1))
        .with_task(TaskBuilder::new("a", "exec").build())
        .build();

    assert!(job.runtime_parameters().is_empty());
}

#[test]
fn executor_input_allocates_deterministic_locations() {
    let job = two_task_job();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();
    let task = spec.task("a").unwrap();

    let resolved = resolve_task_inputs(task, &spec, &ctx, &OutputStore::new()).unwrap();
    let input = build_executor_input(task, &spec, &ctx, &resolved).unwrap();

    assert_eq!(
        input.outputs.parameters["count"].output_file,
        "/runs/job/a/parameters/count"
    );
    assert_eq!(input.outputs.output_file, "/runs/job/a/executor_output.json");
    let skeleton = input.outputs.artifacts["dataset"].first().unwrap();
    assert_eq!(skeleton.uri, "mem://artifacts/job/a/dataset");
    assert_eq!(skeleton.artifact_type.identity(), "system.Dataset");
}

#[test]
fn job_output_directory_overrides_engine_root() {
    let job = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_output_directory("gs://bucket/root/")
        .with_task(
            TaskBuilder::new("a", "exec")
                .output_artifact("model", "system.Model")
                .build(),
        )
        .build();
    let ctx = RunContext::new(&job, &test_engine_config());

    assert_eq!(ctx.artifact_uri("a", "model"), "gs://bucket/root/job/a/model");
}

#[test]
fn placeholders_expand_against_the_built_input() {
    let job = two_task_job();
    let ctx = RunContext::new(&job, &test_engine_config());
    let spec = job.spec();
    let task = spec.task("b").unwrap();
    let mut outputs = OutputStore::new();
    outputs.record("a", producer_outputs());

    let resolved = resolve_task_inputs(task, &spec, &ctx, &outputs).unwrap();
    let input = build_executor_input(task, &spec, &ctx, &resolved).unwrap();

    let templates = vec![
        "--n={{$.inputs.parameters['n']}}".to_string(),
        "{{$.inputs.artifacts['data'].uri}}".to_string(),
        "{{$.outputs.parameters['score'].output_file}}".to_string(),
    ];
    let argv = expand_all(&templates, &input, "b").unwrap();
    assert_eq!(
        argv,
        vec![
            "--n=3".to_string(),
            "mem://artifacts/job/a/dataset".to_string(),
            "/runs/job/b/parameters/score".to_string(),
        ]
    );

    let err = expand_all(
        &["{{$.inputs.parameters['absent']}}".to_string()],
        &input,
        "b",
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::PlaceholderResolution { .. }));
}
