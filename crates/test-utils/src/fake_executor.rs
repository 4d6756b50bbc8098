use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use dagspec::engine::{RuntimeEvent, TaskName, TaskOutcome};
use dagspec::errors::EngineError;
use dagspec::exec::{BackendFuture, ContainerInvocation, ExecutorBackend};
use dagspec::fs::FileSystem;
use dagspec::fs::mock::MockFileSystem;
use dagspec::ir::ExecutorOutput;
use tokio::sync::mpsc;

/// What the fake does when a task is dispatched.
#[derive(Debug, Clone, Default)]
pub struct FakeTaskResult {
    /// Raw text written to each output parameter file.
    pub parameters: BTreeMap<String, String>,
    /// Written to the executor output file when set.
    pub executor_output: Option<ExecutorOutput>,
    /// Non-zero exit code; `None` means success.
    pub exit_code: Option<i32>,
    /// Never complete (until canceled).
    pub hang: bool,
}

impl FakeTaskResult {
    pub fn succeed() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: &str, text: &str) -> Self {
        self.parameters.insert(key.to_string(), text.to_string());
        self
    }

    pub fn executor_output(mut self, doc: ExecutorOutput) -> Self {
        self.executor_output = Some(doc);
        self
    }

    pub fn fail(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

/// A fake executor that:
/// - records every invocation it receives
/// - writes the configured outputs into a `MockFileSystem`
/// - immediately reports `TaskCompleted` unless told to hang.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    fs: MockFileSystem,
    results: HashMap<TaskName, FakeTaskResult>,
    invocations: Arc<Mutex<Vec<ContainerInvocation>>>,
    canceled: Arc<Mutex<Vec<TaskName>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, fs: MockFileSystem) -> Self {
        Self {
            runtime_tx,
            fs,
            results: HashMap::new(),
            invocations: Arc::new(Mutex::new(Vec::new())),
            canceled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_result(mut self, task: &str, result: FakeTaskResult) -> Self {
        self.results.insert(task.to_string(), result);
        self
    }

    /// Shared handle on the recorded invocations.
    pub fn invocations(&self) -> Arc<Mutex<Vec<ContainerInvocation>>> {
        Arc::clone(&self.invocations)
    }

    pub fn canceled(&self) -> Arc<Mutex<Vec<TaskName>>> {
        Arc::clone(&self.canceled)
    }

    fn write_outputs(&self, invocation: &ContainerInvocation, result: &FakeTaskResult) -> anyhow::Result<()> {
        let outputs = &invocation.executor_input.outputs;
        for (key, text) in &result.parameters {
            if let Some(location) = outputs.parameters.get(key) {
                self.fs.write(Path::new(&location.output_file), text.as_bytes())?;
            }
        }
        if let Some(doc) = &result.executor_output {
            let json = serde_json::to_vec(doc)?;
            self.fs.write(Path::new(&outputs.output_file), &json)?;
        }
        Ok(())
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(&mut self, invocations: Vec<ContainerInvocation>) -> BackendFuture<'_> {
        Box::pin(async move {
            for invocation in invocations {
                let result = self
                    .results
                    .get(&invocation.task)
                    .cloned()
                    .unwrap_or_default();
                self.invocations.lock().unwrap().push(invocation.clone());

                if result.hang {
                    continue;
                }
                self.write_outputs(&invocation, &result)?;

                let outcome = match result.exit_code {
                    Some(code) => TaskOutcome::Failed(code),
                    None => TaskOutcome::Success,
                };
                self.runtime_tx
                    .send(RuntimeEvent::TaskCompleted {
                        task: invocation.task.clone(),
                        outcome,
                    })
                    .await
                    .map_err(|e| EngineError::Other(anyhow::anyhow!("runtime gone: {e}")))?;
            }
            Ok(())
        })
    }

    fn cancel(&mut self, tasks: Vec<TaskName>) -> BackendFuture<'_> {
        Box::pin(async move {
            self.canceled.lock().unwrap().extend(tasks);
            Ok(())
        })
    }
}
