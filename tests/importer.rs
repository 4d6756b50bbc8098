mod common;

use common::builders::{PipelineJobBuilder, TaskBuilder, importer, test_engine_config};
use common::fake_executor::FakeExecutor;
use common::{TestServices, with_timeout};
use dagspec::config::CompiledJob;
use dagspec::engine::Runtime;
use dagspec::ir::{ArtifactTypeSchema, RuntimeArtifact, Value};
use dagspec::metadata::ArtifactState;
use tokio::sync::mpsc;

const URI: &str = "gs://data/raw.csv";

fn job(reimport: bool) -> CompiledJob {
    PipelineJobBuilder::new("run-1", "pipe")
        .with_executor("import", importer(URI, "system.Dataset", reimport))
        .with_task(
            TaskBuilder::new("import", "import")
                .output_artifact("artifact", "system.Dataset")
                .build(),
        )
        .build()
}

fn seed(svc: &TestServices) {
    let mut existing = RuntimeArtifact::new(
        "earlier",
        ArtifactTypeSchema::SchemaTitle("system.Dataset".into()),
        URI,
    );
    existing
        .properties
        .insert("rows".into(), Value::Int(100));
    svc.metadata
        .insert_artifact(existing, vec!["pipe".into()], ArtifactState::Live)
        .unwrap();
}

async fn imported(svc: &TestServices, job: &CompiledJob) -> RuntimeArtifact {
    let core = svc.core(job, &test_engine_config());
    let (tx, rx) = mpsc::channel(8);
    let fake = FakeExecutor::new(tx, svc.fs.clone());
    let invocations = fake.invocations();

    let summary = with_timeout(Runtime::new(core, rx, fake).run())
        .await
        .unwrap();
    assert!(summary.succeeded());
    assert!(invocations.lock().unwrap().is_empty());
    (*summary.outputs["import"].artifacts("artifact").unwrap()[0]).clone()
}

#[tokio::test]
async fn without_reimport_existing_artifact_is_reused() {
    common::init_tracing();

    let svc = TestServices::new();
    seed(&svc);

    let artifact = imported(&svc, &job(false)).await;
    assert_eq!(artifact.uri, URI);
    assert_eq!(artifact.properties.get("rows"), Some(&Value::Int(100)));
    assert_eq!(svc.metadata.artifacts().unwrap().len(), 1);
}

#[tokio::test]
async fn reimport_registers_a_fresh_artifact() {
    let svc = TestServices::new();
    seed(&svc);

    let artifact = imported(&svc, &job(true)).await;
    assert_eq!(artifact.uri, URI);
    assert!(artifact.properties.is_empty());
    assert_eq!(artifact.name, "import.artifact");
}

#[tokio::test]
async fn first_import_is_published_as_live() {
    let svc = TestServices::new();

    imported(&svc, &job(false)).await;

    let stored = svc.metadata.artifacts().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].artifact.uri, URI);
    assert_eq!(stored[0].state, ArtifactState::Live);
    assert_eq!(stored[0].contexts, vec!["pipe".to_string()]);
}

#[test]
fn importer_must_declare_one_output() {
    let raw = PipelineJobBuilder::new("run-1", "pipe")
        .with_executor("import", importer(URI, "system.Dataset", false))
        .with_task(TaskBuilder::new("import", "import").build())
        .build_raw();

    assert!(CompiledJob::try_from(raw).is_err());
}
