mod common;

use common::builders::{PipelineJobBuilder, TaskBuilder, resolver, resolver_with_cardinality, test_engine_config};
use dagspec::config::CompiledJob;
use dagspec::errors::EngineError;
use dagspec::ir::{ArtifactTypeSchema, ExecutorSpec, QueryCardinality, ResolverSpec, RuntimeArtifact, Value};
use dagspec::metadata::{ArtifactState, InMemoryMetadataStore};
use dagspec::resolve::{RunContext, evaluate_resolver};

fn model(uri: &str, accuracy: f64) -> RuntimeArtifact {
    let mut artifact = RuntimeArtifact::new(
        "model",
        ArtifactTypeSchema::SchemaTitle("system.Model".into()),
        uri,
    );
    artifact
        .properties
        .insert("accuracy".into(), Value::Double(accuracy));
    artifact
}

fn seeded_store() -> InMemoryMetadataStore {
    let store = InMemoryMetadataStore::new();
    for (uri, acc) in [("gs://m/1", 0.7), ("gs://m/2", 0.9), ("gs://m/3", 0.8)] {
        store
            .insert_artifact(model(uri, acc), vec!["pipe".into()], ArtifactState::Live)
            .unwrap();
    }
    store
        .insert_artifact(
            model("gs://other/1", 0.99),
            vec!["other-pipe".into()],
            ArtifactState::Live,
        )
        .unwrap();
    store
}

fn job_with(spec: ExecutorSpec) -> CompiledJob {
    PipelineJobBuilder::new("job", "pipe")
        .with_executor("resolve", spec)
        .with_task(
            TaskBuilder::new("latest", "resolve")
                .output_artifact("model", "system.Model")
                .build(),
        )
        .build()
}

fn resolver_spec(spec: ExecutorSpec) -> ResolverSpec {
    match spec {
        ExecutorSpec::Resolver(r) => r,
        other => panic!("expected resolver, got {}", other.kind()),
    }
}

fn uris(outputs: &dagspec::outputs::TaskOutputs, key: &str) -> Vec<String> {
    outputs
        .artifacts(key)
        .unwrap()
        .iter()
        .map(|a| a.uri.clone())
        .collect()
}

#[test]
fn default_limit_returns_the_most_recent_match() {
    common::init_tracing();

    let spec = resolver(&[("model", "artifact_type = 'system.Model'", None)]);
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let outputs = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &seeded_store()).unwrap();
    assert_eq!(uris(&outputs, "model"), vec!["gs://m/3"]);
}

#[test]
fn larger_limit_orders_most_recent_first_within_context() {
    let spec = resolver(&[("model", "artifact_type = 'system.Model'", Some(3))]);
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let outputs = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &seeded_store()).unwrap();
    assert_eq!(uris(&outputs, "model"), vec!["gs://m/3", "gs://m/2", "gs://m/1"]);
}

#[test]
fn explicit_context_clause_overrides_the_implicit_scope() {
    let spec = resolver(&[(
        "model",
        "contexts.name = 'other-pipe' and artifact_type = 'system.Model'",
        Some(5),
    )]);
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let outputs = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &seeded_store()).unwrap();
    assert_eq!(uris(&outputs, "model"), vec!["gs://other/1"]);
}

#[test]
fn numeric_property_filter_matches_by_value() {
    let spec = resolver(&[("model", "properties['accuracy'] = 0.9", None)]);
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let outputs = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &seeded_store()).unwrap();
    assert_eq!(uris(&outputs, "model"), vec!["gs://m/2"]);
}

#[test]
fn no_match_is_artifact_not_found() {
    let spec = resolver(&[("model", "artifact_type = 'system.Dataset'", None)]);
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let err = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &seeded_store()).unwrap_err();
    match err {
        EngineError::ArtifactNotFound { task, output_key, .. } => {
            assert_eq!(task, "latest");
            assert_eq!(output_key, "model");
        }
        other => panic!("expected ArtifactNotFound, got {other:?}"),
    }
}

#[test]
fn unbounded_query_may_be_empty() {
    let spec = resolver_with_cardinality(
        &[("model", "artifact_type = 'system.Dataset'", Some(10))],
        QueryCardinality::Unbounded,
    );
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let outputs = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &seeded_store()).unwrap();
    assert!(outputs.artifacts("model").unwrap().is_empty());
}

#[test]
fn non_live_artifacts_can_be_excluded_by_state() {
    let store = seeded_store();
    store
        .insert_artifact(model("gs://m/deleted", 0.5), vec!["pipe".into()], ArtifactState::Deleted)
        .unwrap();

    let spec = resolver(&[("model", "state = 'live'", None)]);
    let job = job_with(spec.clone());
    let ctx = RunContext::new(&job, &test_engine_config());

    let outputs = evaluate_resolver("latest", &resolver_spec(spec), &ctx, &store).unwrap();
    assert_eq!(uris(&outputs, "model"), vec!["gs://m/3"]);
}

#[test]
fn malformed_filter_fails_compilation() {
    let raw = PipelineJobBuilder::new("job", "pipe")
        .with_executor("resolve", resolver(&[("model", "uri ~ 'x'", None)]))
        .with_task(
            TaskBuilder::new("latest", "resolve")
                .output_artifact("model", "system.Model")
                .build(),
        )
        .build_raw();

    assert!(CompiledJob::try_from(raw).is_err());
}
