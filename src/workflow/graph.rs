/// Adjacency view over a workflow definition
///
/// Answers the structural questions the scheduler and engine ask: what a step
/// depends on, where it leads, which steps are entry points. Validation
/// builds a petgraph DAG once to reject duplicate ids, dangling edges and
/// cycles before a run is scheduled.

use crate::workflow::types::{Edge, Step, StepKind, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Shape errors found while validating a definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    #[error("edge references unknown step '{step_id}' ({side} side)")]
    UnknownStepReference {
        step_id: String,
        side: &'static str,
    },

    #[error("workflow graph contains a cycle through step '{0}'")]
    CycleDetected(String),
}

/// Borrowed adjacency view over a step list and an edge list
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    steps: &'a [Step],
    edges: &'a [Edge],
    /// Step id -> position in the step list
    position: HashMap<&'a str, usize>,
}

impl<'a> WorkflowGraph<'a> {
    pub fn new(steps: &'a [Step], edges: &'a [Edge]) -> Self {
        let mut position = HashMap::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            position.entry(step.id.as_str()).or_insert(index);
        }
        Self {
            steps,
            edges,
            position,
        }
    }

    pub fn from_definition(definition: &'a WorkflowDefinition) -> Self {
        Self::new(&definition.steps, &definition.edges)
    }

    pub fn steps(&self) -> &'a [Step] {
        self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&'a Step> {
        self.position.get(step_id).map(|&i| &self.steps[i])
    }

    /// Steps with an edge pointing into `step_id`, in step-list order
    pub fn dependencies_of(&self, step_id: &str) -> Vec<&'a Step> {
        let sources: HashSet<&str> = self
            .incoming(step_id)
            .map(|edge| edge.source.as_str())
            .collect();
        self.steps
            .iter()
            .filter(|step| sources.contains(step.id.as_str()))
            .collect()
    }

    /// Edges whose target is `step_id`, in edge-list order
    pub fn incoming<'s>(&'s self, step_id: &'s str) -> impl Iterator<Item = &'a Edge> + 's {
        self.edges.iter().filter(move |edge| edge.target == step_id)
    }

    /// Edges whose source is `step_id`, in edge-list order
    pub fn outgoing<'s>(&'s self, step_id: &'s str) -> impl Iterator<Item = &'a Edge> + 's {
        self.edges.iter().filter(move |edge| edge.source == step_id)
    }

    /// Steps of kind webhook_trigger or schedule_trigger
    pub fn trigger_steps(&self) -> Vec<&'a Step> {
        self.steps.iter().filter(|s| s.kind.is_trigger()).collect()
    }

    /// Steps with no incoming edge
    pub fn root_steps(&self) -> Vec<&'a Step> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.steps
            .iter()
            .filter(|s| !targets.contains(s.id.as_str()))
            .collect()
    }

    /// Whether any edge out of `step_id` lands on an error_handler step
    pub fn has_error_handler_successor(&self, step_id: &str) -> bool {
        self.outgoing(step_id).any(|edge| {
            self.step(&edge.target)
                .is_some_and(|target| target.kind == StepKind::ErrorHandler)
        })
    }

    /// Reject duplicate ids, dangling edges and cycles
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();

        for step in self.steps {
            if index_of.contains_key(step.id.as_str()) {
                return Err(GraphError::DuplicateStepId(step.id.clone()));
            }
            index_of.insert(step.id.as_str(), graph.add_node(step.id.as_str()));
        }

        for edge in self.edges {
            let from = index_of.get(edge.source.as_str()).ok_or_else(|| {
                GraphError::UnknownStepReference {
                    step_id: edge.source.clone(),
                    side: "source",
                }
            })?;
            let to = index_of.get(edge.target.as_str()).ok_or_else(|| {
                GraphError::UnknownStepReference {
                    step_id: edge.target.clone(),
                    side: "target",
                }
            })?;
            graph.add_edge(*from, *to, ());
        }

        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| GraphError::CycleDetected(graph[cycle.node_id()].to_string()))
    }
}
