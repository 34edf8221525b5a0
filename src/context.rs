//! Evaluation Context
//!
//! [`EvaluationContext`] identifies one fixpoint step (stratum, iteration,
//! rule). It is a plain value: evaluators create a new one per step and pass
//! it down to compiled rules, which use it to name dataflow sinks and to tag
//! tracing spans.
//!
//! [`ProgramContext`] holds the per-program predicate cardinalities that
//! would otherwise live in a process-wide cache. The reasoner resets it at
//! the start of every `Reasoner::evaluate` and adds each stratum's derived
//! counts; callers read it through `Reasoner::program_context`.

use std::collections::HashMap;
use std::fmt;

use crate::ast::Predicate;

/// Identifies a single rule evaluation within a stratum fixpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EvaluationContext {
    pub stratum: usize,
    pub iteration: usize,
    pub rule: usize,
}

impl EvaluationContext {
    pub fn new(stratum: usize, iteration: usize, rule: usize) -> Self {
        EvaluationContext {
            stratum,
            iteration,
            rule,
        }
    }

    pub fn with_iteration(self, iteration: usize) -> Self {
        EvaluationContext { iteration, ..self }
    }

    pub fn with_rule(self, rule: usize) -> Self {
        EvaluationContext { rule, ..self }
    }

    /// Flow id suffix used in sink names and result directories
    pub fn flow_id(&self) -> String {
        format!("_s{}_i{}_r{}", self.stratum, self.iteration, self.rule)
    }
}

impl fmt::Display for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stratum {} / iteration {} / rule {}",
            self.stratum, self.iteration, self.rule
        )
    }
}

/// Per-program predicate counts, maintained by the reasoner during `evaluate`
#[derive(Debug, Default)]
pub struct ProgramContext {
    predicate_counts: HashMap<Predicate, usize>,
}

impl ProgramContext {
    pub fn new() -> Self {
        ProgramContext::default()
    }

    /// Last known number of facts for a predicate (0 when never observed)
    pub fn count(&self, predicate: &Predicate) -> usize {
        self.predicate_counts.get(predicate).copied().unwrap_or(0)
    }

    pub fn record_count(&mut self, predicate: &Predicate, count: usize) {
        self.predicate_counts.insert(predicate.clone(), count);
    }

    pub fn add_count(&mut self, predicate: &Predicate, added: usize) {
        *self
            .predicate_counts
            .entry(predicate.clone())
            .or_insert(0) += added;
    }

    /// All observed predicates with their counts, sorted by predicate
    pub fn counts(&self) -> Vec<(Predicate, usize)> {
        let mut out: Vec<_> = self
            .predicate_counts
            .iter()
            .map(|(p, c)| (p.clone(), *c))
            .collect();
        out.sort();
        out
    }
}
