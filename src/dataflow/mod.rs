//! # Dataflow Engine Contract
//!
//! What the core needs from an execution engine: accept an operator graph
//! with its input relations, run it to completion, and hand back the result
//! tuples under a sink name.
//!
//! ```text
//! submit(job)          blocks until every worker finished
//! open_for_read(sink)  drains the tuples the job wrote to `sink`
//! ```
//!
//! [`TimelyEngine`] is the in-process implementation on timely and
//! differential dataflow.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::context::EvaluationContext;
use crate::ir::PlanNode;
use crate::value::{Relation, Tuple};

pub mod timely_engine;

pub use timely_engine::TimelyEngine;

/// Dataflow errors
#[derive(Error, Debug)]
pub enum DataflowError {
    /// The graph reads an input the job does not bind
    #[error("Unknown input binding '{0}'")]
    UnknownBinding(String),

    /// A bound relation does not have the arity the graph expects
    #[error("Input '{binding}' expects arity {expected}, found a tuple of arity {found}")]
    ArityMismatch {
        binding: String,
        expected: usize,
        found: usize,
    },

    /// The graph itself is malformed
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// A worker failed or panicked
    #[error("Dataflow worker failed: {0}")]
    Worker(String),

    /// Nothing was written under this sink name
    #[error("Unknown sink '{0}'")]
    UnknownSink(String),
}

/// Name under which a job's result can be read back
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkBinding {
    pub name: String,
}

impl SinkBinding {
    /// `<result-name><flow-id>`
    pub fn new(result_name: &str, ctx: &EvaluationContext) -> Self {
        SinkBinding {
            name: format!("{result_name}{}", ctx.flow_id()),
        }
    }

    pub fn named(name: &str) -> Self {
        SinkBinding {
            name: name.to_string(),
        }
    }
}

impl fmt::Display for SinkBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One unit of work for the engine
#[derive(Debug, Clone)]
pub struct DataflowJob {
    pub graph: PlanNode,
    pub sources: HashMap<String, Relation>,
    pub sink: SinkBinding,
}

impl DataflowJob {
    pub fn new(graph: PlanNode, sink: SinkBinding) -> Self {
        DataflowJob {
            graph,
            sources: HashMap::new(),
            sink,
        }
    }

    pub fn bind(mut self, binding: &str, relation: Relation) -> Self {
        self.sources.insert(binding.to_string(), relation);
        self
    }

    /// Check that the graph is well formed and every input it reads is
    /// bound with the right arity
    pub fn validate(&self) -> Result<(), DataflowError> {
        check_join_keys(&self.graph)?;
        for (binding, arity) in self.graph.inputs() {
            let relation = self
                .sources
                .get(binding)
                .ok_or_else(|| DataflowError::UnknownBinding(binding.to_string()))?;
            if let Some(tuple) = relation.iter().find(|t| t.arity() != arity) {
                return Err(DataflowError::ArityMismatch {
                    binding: binding.to_string(),
                    expected: arity,
                    found: tuple.arity(),
                });
            }
        }
        Ok(())
    }
}

/// Join and antijoin keys must pair up one to one
fn check_join_keys(node: &PlanNode) -> Result<(), DataflowError> {
    match node {
        PlanNode::Input { .. } => Ok(()),
        PlanNode::Filter { input, .. }
        | PlanNode::Match { input, .. }
        | PlanNode::Builtin { input, .. }
        | PlanNode::Substitute { input, .. } => check_join_keys(input),
        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
            ..
        }
        | PlanNode::Antijoin {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            if left_keys.len() != right_keys.len() {
                return Err(DataflowError::InvalidPlan(format!(
                    "join keys differ in length: {left_keys:?} vs {right_keys:?}"
                )));
            }
            check_join_keys(left)?;
            check_join_keys(right)
        }
    }
}

/// Execution engine for operator graphs
pub trait DataflowEngine: Send + Sync {
    /// Run a job to completion
    fn submit(&self, job: DataflowJob) -> Result<(), DataflowError>;

    /// Drain the tuples a finished job wrote to `sink`
    fn open_for_read(
        &self,
        sink: &SinkBinding,
    ) -> Result<Box<dyn Iterator<Item = Tuple> + Send>, DataflowError>;

    /// Submit and read back in one step
    fn run(&self, job: DataflowJob) -> Result<Relation, DataflowError> {
        let sink = job.sink.clone();
        self.submit(job)?;
        Ok(self.open_for_read(&sink)?.collect())
    }
}
