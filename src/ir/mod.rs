// src/ir/mod.rs

//! Pipeline IR data definitions.
//!
//! These types mirror the compiled pipeline document handed to the engine:
//! - [`pipeline`] holds the job, spec, task and executor shapes.
//! - [`value`] holds scalar values and their primitive types.
//! - [`artifact`] holds runtime artifacts and their type schemas.
//! - [`executor_io`] holds the per-invocation `ExecutorInput` / `ExecutorOutput`
//!   contract.
//!
//! Everything here is plain serde data; behaviour lives in the other modules.

pub mod artifact;
pub mod executor_io;
pub mod pipeline;
pub mod value;

pub use artifact::{ArtifactTypeSchema, RuntimeArtifact};
pub use executor_io::{ArtifactList, ExecutorInput, ExecutorOutput, Inputs, OutputParameter, Outputs};
pub use pipeline::{
    ArtifactQuerySpec, CachingOptions, DeploymentConfig, ExecutorSpec, ImporterSpec,
    InputArtifactSpec, InputParameterSpec, Lifecycle, LifecycleExec, OutputArtifactSpec,
    OutputParameterSpec, PipelineContainerSpec, PipelineInfo, PipelineSpec, PipelineTaskSpec,
    QueryCardinality, RawPipelineJob, ResolverSpec, RuntimeConfig, RuntimeParameter,
    TaskInputsSpec, TaskOutputsSpec, ValueOrRuntimeParameter,
};
pub use value::{PrimitiveType, Value};
