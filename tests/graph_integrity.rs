mod common;

use common::builders::{ContainerBuilder, PipelineJobBuilder, TaskBuilder, importer, resolver};
use dagspec::config::CompiledJob;
use dagspec::dag::{DependencyKind, TaskGraph};
use dagspec::errors::EngineError;
use dagspec::ir::{PipelineSpec, PrimitiveType};

fn container() -> dagspec::ir::ExecutorSpec {
    ContainerBuilder::new("alpine").command(&["true"]).build()
}

fn spec_of(builder: PipelineJobBuilder) -> PipelineSpec {
    builder.build_raw().pipeline_spec
}

#[test]
fn chain_builds_one_node_per_task_in_topological_order() {
    common::init_tracing();

    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("c", "exec")
                    .param_from_task("x", "b", "out")
                    .build(),
            )
            .with_task(
                TaskBuilder::new("b", "exec")
                    .param_from_task("x", "a", "out")
                    .output_param("out", PrimitiveType::Int)
                    .build(),
            )
            .with_task(
                TaskBuilder::new("a", "exec")
                    .output_param("out", PrimitiveType::Int)
                    .build(),
            ),
    );

    let graph = TaskGraph::build(&spec).unwrap();
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.topological_order(), &["a", "b", "c"]);
    assert_eq!(graph.roots(), vec!["a"]);
    assert_eq!(graph.dependencies_of("c"), &["b".to_string()]);
    assert_eq!(graph.dependents_of("a"), &["b".to_string()]);
}

#[test]
fn dependent_tasks_add_ordering_edges() {
    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(TaskBuilder::new("first", "exec").build())
            .with_task(TaskBuilder::new("second", "exec").after("first").build()),
    );

    let graph = TaskGraph::build(&spec).unwrap();
    assert_eq!(graph.dependencies_of("second"), &["first".to_string()]);
    assert_eq!(graph.roots(), vec!["first"]);
    assert_eq!(
        graph.incoming_edges("second"),
        vec![("first", &DependencyKind::Control)]
    );
}

#[test]
fn incoming_edges_name_the_consumed_outputs() {
    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("train", "exec")
                    .param_from_task("rate", "prep", "lr")
                    .artifact_from_task("data", "prep", "dataset")
                    .build(),
            )
            .with_task(
                TaskBuilder::new("prep", "exec")
                    .output_param("lr", PrimitiveType::Double)
                    .output_artifact("dataset", "system.Dataset")
                    .build(),
            ),
    );

    let graph = TaskGraph::build(&spec).unwrap();
    let edges = graph.incoming_edges("train");
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|(producer, _)| *producer == "prep"));
    assert!(edges.contains(&(
        "prep",
        &DependencyKind::Parameter {
            input_key: "rate".to_string(),
            output_key: "lr".to_string(),
        }
    )));
    assert!(edges.contains(&(
        "prep",
        &DependencyKind::Artifact {
            input_key: "data".to_string(),
            output_key: "dataset".to_string(),
        }
    )));
    // Several edges, one upstream task.
    assert_eq!(graph.dependencies_of("train"), &["prep".to_string()]);
}

#[test]
fn self_reference_is_rejected() {
    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("a", "exec")
                    .param_from_task("x", "a", "out")
                    .output_param("out", PrimitiveType::Int)
                    .build(),
            ),
    );

    let err = TaskGraph::build(&spec).unwrap_err();
    assert!(matches!(err, EngineError::GraphIntegrity { ref task, .. } if task == "a"));
}

#[test]
fn cyclic_pair_is_rejected() {
    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("a", "exec")
                    .param_from_task("x", "b", "out")
                    .output_param("out", PrimitiveType::Int)
                    .build(),
            )
            .with_task(
                TaskBuilder::new("b", "exec")
                    .param_from_task("x", "a", "out")
                    .output_param("out", PrimitiveType::Int)
                    .build(),
            ),
    );

    let err = TaskGraph::build(&spec).unwrap_err();
    assert!(matches!(err, EngineError::GraphIntegrity { .. }));
}

#[test]
fn dangling_producer_is_rejected() {
    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("a", "exec")
                    .artifact_from_task("data", "ghost", "dataset")
                    .build(),
            ),
    );

    let err = TaskGraph::build(&spec).unwrap_err();
    match err {
        EngineError::GraphIntegrity { task, reason } => {
            assert_eq!(task, "a");
            assert!(reason.contains("ghost"), "reason was: {reason}");
        }
        other => panic!("expected GraphIntegrity, got {other:?}"),
    }
}

#[test]
fn undeclared_output_key_is_rejected() {
    let spec = spec_of(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(TaskBuilder::new("a", "exec").build())
            .with_task(
                TaskBuilder::new("b", "exec")
                    .param_from_task("x", "a", "missing")
                    .build(),
            ),
    );

    assert!(matches!(
        TaskGraph::build(&spec),
        Err(EngineError::GraphIntegrity { .. })
    ));
}

#[test]
fn compiling_a_cyclic_job_fails() {
    let raw = PipelineJobBuilder::new("job", "pipe")
        .with_executor("exec", container())
        .with_task(TaskBuilder::new("a", "exec").after("b").build())
        .with_task(TaskBuilder::new("b", "exec").after("a").build())
        .build_raw();

    assert!(matches!(
        CompiledJob::try_from(raw),
        Err(EngineError::GraphIntegrity { .. })
    ));
}

#[test]
fn compiling_with_unknown_executor_fails() {
    let raw = PipelineJobBuilder::new("job", "pipe")
        .with_task(TaskBuilder::new("a", "nowhere").build())
        .build_raw();

    assert!(matches!(
        CompiledJob::try_from(raw),
        Err(EngineError::InvalidSpec(_))
    ));
}

fn compile_error(builder: PipelineJobBuilder) -> EngineError {
    CompiledJob::try_from(builder.build_raw()).unwrap_err()
}

#[test]
fn output_keys_cannot_leave_the_task_directory() {
    for key in ["../../../../victim.txt", "nested/out", "..", "c:\\temp\\x"] {
        let err = compile_error(
            PipelineJobBuilder::new("job", "pipe")
                .with_executor("exec", container())
                .with_task(
                    TaskBuilder::new("a", "exec")
                        .output_param(key, PrimitiveType::String)
                        .build(),
                ),
        );
        assert!(matches!(err, EngineError::InvalidSpec(_)), "key {key:?} gave {err}");
    }

    let err = compile_error(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("a", "exec")
                    .output_artifact("../model", "system.Model")
                    .build(),
            ),
    );
    assert!(matches!(err, EngineError::InvalidSpec(_)));
}

#[test]
fn task_and_job_names_are_single_path_components() {
    let err = compile_error(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("exec", container())
            .with_task(TaskBuilder::new("../a", "exec").build()),
    );
    assert!(matches!(err, EngineError::InvalidSpec(_)));

    let err = compile_error(
        PipelineJobBuilder::new("/tmp/job", "pipe")
            .with_executor("exec", container())
            .with_task(TaskBuilder::new("a", "exec").build()),
    );
    assert!(matches!(err, EngineError::InvalidSpec(_)));

    // Dots inside a name are fine.
    let job = PipelineJobBuilder::new("run.1", "pipe")
        .with_executor("exec", container())
        .with_task(
            TaskBuilder::new("a.v2", "exec")
                .output_param("loss.final", PrimitiveType::Double)
                .build(),
        )
        .build();
    assert_eq!(job.name(), "run.1");
}

#[test]
fn resolver_outputs_need_a_query_each() {
    let err = compile_error(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("latest", resolver(&[("a", "uri = 'x'", None)]))
            .with_executor("exec", container())
            .with_task(
                TaskBuilder::new("latest", "latest")
                    .output_artifact("a", "system.Model")
                    .output_artifact("b", "system.Model")
                    .build(),
            )
            .with_task(
                TaskBuilder::new("c", "exec")
                    .artifact_from_task("model", "latest", "b")
                    .build(),
            ),
    );
    match err {
        EngineError::InvalidSpec(reason) => assert!(reason.contains("'b'"), "reason was: {reason}"),
        other => panic!("expected InvalidSpec, got {other}"),
    }
}

#[test]
fn importer_and_resolver_cannot_declare_output_parameters() {
    let err = compile_error(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("import", importer("gs://d/1", "system.Dataset", false))
            .with_task(
                TaskBuilder::new("import", "import")
                    .output_artifact("artifact", "system.Dataset")
                    .output_param("rows", PrimitiveType::Int)
                    .build(),
            ),
    );
    assert!(matches!(err, EngineError::InvalidSpec(_)));

    let err = compile_error(
        PipelineJobBuilder::new("job", "pipe")
            .with_executor("latest", resolver(&[("model", "uri = 'x'", None)]))
            .with_task(
                TaskBuilder::new("latest", "latest")
                    .output_artifact("model", "system.Model")
                    .output_param("count", PrimitiveType::Int)
                    .build(),
            ),
    );
    assert!(matches!(err, EngineError::InvalidSpec(_)));
}
