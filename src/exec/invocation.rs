// src/exec/invocation.rs

use crate::engine::TaskName;
use crate::ir::ExecutorInput;

/// A fully substituted container task, ready to hand to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInvocation {
    pub task: TaskName,
    pub image: String,
    /// Command with every placeholder expanded.
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// The document the placeholders were expanded against.
    pub executor_input: ExecutorInput,
}

impl ContainerInvocation {
    /// `command` followed by `args`.
    pub fn argv(&self) -> Vec<String> {
        self.command.iter().chain(&self.args).cloned().collect()
    }
}
