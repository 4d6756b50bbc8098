// src/outputs/publish.rs

//! Recording finished executions in the metadata store.

use tracing::debug;

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::ir::ExecutorInput;
use crate::metadata::{ExecutionRecord, ExecutionState, MetadataStore, OutputEvent};
use crate::resolve::RunContext;

use super::TaskOutputs;

fn record(
    ctx: &RunContext,
    task: &str,
    state: ExecutionState,
    fingerprint: Option<&str>,
    output_event: OutputEvent,
    outputs: Option<&TaskOutputs>,
) -> ExecutionRecord {
    ExecutionRecord {
        task: task.to_string(),
        context: ctx.pipeline_name.clone(),
        run: ctx.job_name.clone(),
        state,
        fingerprint: fingerprint.map(str::to_string),
        output_event,
        inputs: BTreeMap::new(),
        input_parameters: BTreeMap::new(),
        outputs: outputs.map(TaskOutputs::artifact_lists).unwrap_or_default(),
    }
}

/// Link the artifacts and parameter values an execution consumed.
fn with_inputs(mut rec: ExecutionRecord, input: &ExecutorInput) -> ExecutionRecord {
    rec.inputs = input
        .inputs
        .artifacts
        .iter()
        .map(|(key, list)| (key.clone(), list.artifacts.clone()))
        .collect();
    rec.input_parameters = input.inputs.parameters.clone();
    rec
}

fn put(store: &dyn MetadataStore, rec: ExecutionRecord) -> Result<u64> {
    let task = rec.task.clone();
    let state = rec.state;
    let id = store.put_execution(rec)?;
    debug!(task = %task, ?state, execution_id = id, "published execution");
    Ok(id)
}

/// A container task was handed to the backend. Its inputs are registered
/// with the execution.
pub fn publish_running_execution(
    store: &dyn MetadataStore,
    ctx: &RunContext,
    task: &str,
    fingerprint: Option<&str>,
    input: &ExecutorInput,
) -> Result<u64> {
    let rec = record(ctx, task, ExecutionState::Running, fingerprint, OutputEvent::Output, None);
    put(store, with_inputs(rec, input))
}

/// A task ran and its outputs are now live artifacts of the pipeline context.
pub fn publish_succeeded_execution(
    store: &dyn MetadataStore,
    ctx: &RunContext,
    task: &str,
    fingerprint: Option<&str>,
    outputs: &TaskOutputs,
) -> Result<u64> {
    put(
        store,
        record(ctx, task, ExecutionState::Complete, fingerprint, OutputEvent::Output, Some(outputs)),
    )
}

/// A task was satisfied from the cache; the reused outputs are republished.
pub fn publish_cached_execution(
    store: &dyn MetadataStore,
    ctx: &RunContext,
    task: &str,
    fingerprint: &str,
    input: &ExecutorInput,
    outputs: &TaskOutputs,
) -> Result<u64> {
    let rec = record(
        ctx,
        task,
        ExecutionState::Cached,
        Some(fingerprint),
        OutputEvent::Output,
        Some(outputs),
    );
    put(store, with_inputs(rec, input))
}

pub fn publish_failed_execution(
    store: &dyn MetadataStore,
    ctx: &RunContext,
    task: &str,
    fingerprint: Option<&str>,
) -> Result<u64> {
    put(
        store,
        record(ctx, task, ExecutionState::Failed, fingerprint, OutputEvent::Output, None),
    )
}

pub fn publish_canceled_execution(
    store: &dyn MetadataStore,
    ctx: &RunContext,
    task: &str,
) -> Result<u64> {
    put(
        store,
        record(ctx, task, ExecutionState::Canceled, None, OutputEvent::Output, None),
    )
}

/// A resolver selected existing artifacts. They are linked to the execution
/// without being registered again.
pub fn publish_internal_execution(
    store: &dyn MetadataStore,
    ctx: &RunContext,
    task: &str,
    outputs: &TaskOutputs,
) -> Result<u64> {
    put(
        store,
        record(
            ctx,
            task,
            ExecutionState::Complete,
            None,
            OutputEvent::InternalOutput,
            Some(outputs),
        ),
    )
}
