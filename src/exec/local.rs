// src/exec/local.rs

//! Executor loop for local processes.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{RuntimeEvent, TaskName, TaskOutcome};

use super::invocation::ContainerInvocation;

#[derive(Debug)]
pub enum ExecMessage {
    Run(ContainerInvocation),
    Cancel(TaskName),
}

/// Handle for a dispatched invocation.
struct ActiveTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop and return its inbox.
///
/// Each invocation runs in its own Tokio task once a permit of the shared
/// semaphore is available, so at most `max_parallel` processes run at once.
pub fn spawn_local_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    max_parallel: usize,
) -> mpsc::Sender<ExecMessage> {
    let (tx, mut rx) = mpsc::channel::<ExecMessage>(32);
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));

    tokio::spawn(async move {
        info!(max_parallel, "executor loop started");
        let mut active: HashMap<TaskName, ActiveTask> = HashMap::new();

        while let Some(msg) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());
            match msg {
                ExecMessage::Run(invocation) => {
                    start_invocation(invocation, &mut active, &permits, &runtime_tx);
                }
                ExecMessage::Cancel(task) => cancel_invocation(&task, &mut active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn start_invocation(
    invocation: ContainerInvocation,
    active: &mut HashMap<TaskName, ActiveTask>,
    permits: &Arc<Semaphore>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let name = invocation.task.clone();
    if let Some(existing) = active.get(&name) {
        if !existing.handle.is_finished() {
            warn!(task = %name, "task is already running; ignoring duplicate dispatch");
            return;
        }
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let permits = Arc::clone(permits);

    let handle = tokio::spawn(async move {
        let mut cancel_rx = cancel_rx;
        // A task canceled while queued never starts its process.
        let permit = tokio::select! {
            permit = permits.acquire_owned() => permit,
            _ = &mut cancel_rx => {
                info!(task = %invocation.task, "canceled while waiting for a slot");
                return;
            }
        };
        let Ok(_permit) = permit else {
            debug!(task = %invocation.task, "semaphore closed before start");
            return;
        };
        run_invocation(invocation, rt_tx, cancel_rx).await;
    });

    active.insert(
        name,
        ActiveTask {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel_invocation(task: &str, active: &mut HashMap<TaskName, ActiveTask>) {
    match active.get_mut(task).and_then(|t| t.cancel.take()) {
        Some(cancel) => {
            info!(task = %task, "cancelling task");
            if cancel.send(()).is_err() {
                debug!(task = %task, "process already finished while cancelling");
            }
        }
        None => debug!(task = %task, "cancel for task that is not running; ignoring"),
    }
}

/// Run one invocation and report its completion.
///
/// A canceled invocation is killed and reports nothing.
async fn run_invocation(
    invocation: ContainerInvocation,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let task = invocation.task.clone();
    let outcome = match run_process(&invocation, cancel_rx).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => return,
        Err(err) => {
            error!(task = %task, error = %err, "task execution error");
            TaskOutcome::Failed(-1)
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(task = %task, "runtime gone; dropping completion");
    }
}

async fn run_process(
    invocation: &ContainerInvocation,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<TaskOutcome>> {
    let argv = invocation.argv();
    let Some((program, rest)) = argv.split_first() else {
        bail!("task '{}' has an empty command line", invocation.task);
    };

    info!(
        task = %invocation.task,
        image = %invocation.image,
        program = %program,
        "starting task process"
    );

    let mut child = Command::new(program)
        .args(rest)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", invocation.task))?;

    if let Some(stdout) = child.stdout.take() {
        let task = invocation.task.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %task, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let task = invocation.task.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("waiting for process of task '{}'", invocation.task))?;
            let code = status.code().unwrap_or(-1);
            info!(task = %invocation.task, exit_code = code, success = status.success(), "task process exited");
            Ok(Some(if status.success() {
                TaskOutcome::Success
            } else {
                TaskOutcome::Failed(code)
            }))
        }
        cancel = &mut cancel_rx => {
            if cancel.is_ok() {
                if let Err(e) = child.kill().await {
                    warn!(task = %invocation.task, error = %e, "failed to kill process on cancellation");
                }
            }
            Ok(None)
        }
    }
}
