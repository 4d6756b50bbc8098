// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::engine::TaskName;
use crate::errors::{EngineError, Result};
use crate::ir::{InputParameterSpec, PipelineSpec};

/// Why one task depends on another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
    /// Consumer input parameter `input_key` reads producer output `output_key`.
    Parameter { input_key: String, output_key: String },
    /// Consumer input artifact `input_key` reads producer output `output_key`.
    Artifact { input_key: String, output_key: String },
    /// Ordering only (`dependent_tasks`), no data.
    Control,
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct upstream tasks (data or control), deduplicated.
    deps: Vec<TaskName>,
    /// Direct downstream tasks.
    dependents: Vec<TaskName>,
}

/// The task DAG of a pipeline.
///
/// Nodes are task names; edges point producer -> consumer and carry a
/// [`DependencyKind`]. Two tasks may be joined by several edges (one per
/// consumed output plus an optional control edge).
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraph<TaskName, DependencyKind>,
    index: HashMap<TaskName, NodeIndex>,
    nodes: HashMap<TaskName, DagNode>,
    /// Declaration order of the tasks.
    declared: Vec<TaskName>,
    /// One valid topological order.
    order: Vec<TaskName>,
}

impl TaskGraph {
    /// Build and validate the graph for a pipeline spec.
    ///
    /// Fails with [`EngineError::GraphIntegrity`] on a cycle, on a
    /// `producer_task`/`dependent_tasks` naming an unknown task, or on a
    /// reference to an output key the producer does not declare.
    pub fn build(spec: &PipelineSpec) -> Result<Self> {
        let mut graph: DiGraph<TaskName, DependencyKind> = DiGraph::new();
        let mut index = HashMap::new();
        let mut declared = Vec::with_capacity(spec.tasks.len());

        for task in &spec.tasks {
            if index.contains_key(&task.name) {
                return Err(EngineError::GraphIntegrity {
                    task: task.name.clone(),
                    reason: "task name is declared more than once".to_string(),
                });
            }
            let idx = graph.add_node(task.name.clone());
            index.insert(task.name.clone(), idx);
            declared.push(task.name.clone());
        }

        for task in &spec.tasks {
            let consumer = index[&task.name];

            for (input_key, param) in &task.inputs.parameters {
                if let InputParameterSpec::TaskOutputParameter {
                    producer_task,
                    output_parameter_key,
                } = param
                {
                    let producer = lookup_producer(spec, &index, &task.name, producer_task)?;
                    let declares_key = spec
                        .task(producer_task)
                        .is_some_and(|p| p.outputs.parameters.contains_key(output_parameter_key));
                    if !declares_key {
                        return Err(EngineError::GraphIntegrity {
                            task: task.name.clone(),
                            reason: format!(
                                "input parameter '{input_key}' references output parameter '{output_parameter_key}' \
                                 which task '{producer_task}' does not declare"
                            ),
                        });
                    }
                    graph.add_edge(
                        producer,
                        consumer,
                        DependencyKind::Parameter {
                            input_key: input_key.clone(),
                            output_key: output_parameter_key.clone(),
                        },
                    );
                }
            }

            for (input_key, artifact) in &task.inputs.artifacts {
                let producer = lookup_producer(spec, &index, &task.name, &artifact.producer_task)?;
                let declares_key = spec
                    .task(&artifact.producer_task)
                    .is_some_and(|p| p.outputs.artifacts.contains_key(&artifact.output_artifact_key));
                if !declares_key {
                    return Err(EngineError::GraphIntegrity {
                        task: task.name.clone(),
                        reason: format!(
                            "input artifact '{input_key}' references output artifact '{}' \
                             which task '{}' does not declare",
                            artifact.output_artifact_key, artifact.producer_task
                        ),
                    });
                }
                graph.add_edge(
                    producer,
                    consumer,
                    DependencyKind::Artifact {
                        input_key: input_key.clone(),
                        output_key: artifact.output_artifact_key.clone(),
                    },
                );
            }

            for upstream in &task.dependent_tasks {
                let producer = lookup_producer(spec, &index, &task.name, upstream)?;
                graph.add_edge(producer, consumer, DependencyKind::Control);
            }
        }

        let order = match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|idx| graph[idx].clone()).collect::<Vec<_>>(),
            Err(cycle) => {
                return Err(EngineError::GraphIntegrity {
                    task: graph[cycle.node_id()].clone(),
                    reason: "dependency cycle detected".to_string(),
                });
            }
        };

        let mut nodes: HashMap<TaskName, DagNode> = declared
            .iter()
            .map(|name| (name.clone(), DagNode::default()))
            .collect();

        for name in &declared {
            let idx = index[name];
            let deps: BTreeSet<TaskName> = graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|n| graph[n].clone())
                .collect();
            let dependents: BTreeSet<TaskName> = graph
                .neighbors_directed(idx, Direction::Outgoing)
                .map(|n| graph[n].clone())
                .collect();
            if let Some(node) = nodes.get_mut(name) {
                node.deps = deps.into_iter().collect();
                node.dependents = dependents.into_iter().collect();
            }
        }

        debug!(tasks = declared.len(), edges = graph.edge_count(), "built task graph");

        Ok(Self {
            graph,
            index,
            nodes,
            declared,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Task names in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(|s| s.as_str())
    }

    /// A topological order: every producer precedes its consumers.
    pub fn topological_order(&self) -> &[TaskName] {
        &self.order
    }

    /// Immediate upstream tasks (data and control).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate downstream tasks.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks with no incoming edges, in declaration order.
    pub fn roots(&self) -> Vec<&str> {
        self.tasks()
            .filter(|name| self.dependencies_of(name).is_empty())
            .collect()
    }

    /// All edges entering `name`, as `(producer, kind)`.
    pub fn incoming_edges(&self, name: &str) -> Vec<(&str, &DependencyKind)> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut edges: Vec<(&str, &DependencyKind)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (self.graph[e.source()].as_str(), e.weight()))
            .collect();
        edges.sort_by(|a, b| a.0.cmp(b.0));
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

fn lookup_producer(
    spec: &PipelineSpec,
    index: &HashMap<TaskName, NodeIndex>,
    consumer: &str,
    producer: &str,
) -> Result<NodeIndex> {
    if producer == consumer {
        return Err(EngineError::GraphIntegrity {
            task: consumer.to_string(),
            reason: "task references itself as an upstream task".to_string(),
        });
    }
    match index.get(producer) {
        Some(idx) if spec.task(producer).is_some() => Ok(*idx),
        _ => Err(EngineError::GraphIntegrity {
            task: consumer.to_string(),
            reason: format!("reference to unknown task '{producer}'"),
        }),
    }
}
