//! # Stratum Evaluation
//!
//! Drives the compiled rules of one stratum to a fixpoint. Two strategies:
//!
//! - [`Evaluator::Naive`]: round-robin over every rule until a full round
//!   derives nothing new
//! - [`Evaluator::DependencyAware`]: evaluate every rule once, then re-run
//!   only the rules whose body reads a predicate that just grew, feeding
//!   them the new tuples as deltas
//!
//! Both submit one rule at a time and write each rule's new tuples into the
//! fact store before the next rule runs. Any evaluation error aborts the
//! stratum.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, info_span};

use crate::ast::Predicate;
use crate::dataflow::DataflowEngine;
use crate::error::{EngineError, Result};
use crate::rule_compiler::EvaluableRule;
use crate::storage::{FactSink, FactSource};
use crate::value::Relation;

pub mod dependency;
pub mod naive;

/// Fixpoint strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluator {
    Naive,
    DependencyAware,
}

/// Outcome of one stratum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StratumReport {
    pub stratum: usize,
    /// Evaluations per rule, in rule order
    pub evaluations: Vec<usize>,
    /// Rounds (naive) or scheduling steps including the seed round (dependency-aware)
    pub iterations: usize,
    pub new_facts: usize,
    /// Tuples this stratum added, per head predicate
    pub derived: BTreeMap<Predicate, Relation>,
}

impl StratumReport {
    fn new(stratum: usize, rule_count: usize) -> Self {
        StratumReport {
            stratum,
            evaluations: vec![0; rule_count],
            ..StratumReport::default()
        }
    }

    /// Store a rule's output and account for the tuples that were new
    fn absorb<S: FactSink>(
        &mut self,
        store: &mut S,
        head: &Predicate,
        output: Relation,
    ) -> Result<Relation> {
        let added = store.insert(head, output)?;
        self.new_facts += added.len();
        if !added.is_empty() {
            self.derived
                .entry(head.clone())
                .or_default()
                .union_with(added.clone());
        }
        Ok(added)
    }
}

/// Per-rule evaluation cap; 0 means unlimited
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationLimits {
    pub max_rule_evaluations: usize,
}

impl EvaluationLimits {
    pub fn new(max_rule_evaluations: usize) -> Self {
        EvaluationLimits {
            max_rule_evaluations,
        }
    }

    pub fn unlimited() -> Self {
        EvaluationLimits::default()
    }

    fn allows(&self, evaluations: usize) -> bool {
        self.max_rule_evaluations == 0 || evaluations < self.max_rule_evaluations
    }
}

impl Evaluator {
    /// Select a strategy by its configured name
    pub fn from_strategy(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "naive" => Ok(Evaluator::Naive),
            "dependency" | "dependency_aware" => Ok(Evaluator::DependencyAware),
            other => Err(EngineError::Configuration(format!(
                "unknown evaluation strategy '{other}' (expected 'naive' or 'dependency')"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Evaluator::Naive => "naive",
            Evaluator::DependencyAware => "dependency",
        }
    }

    /// Evaluate the rules of one stratum to a fixpoint
    pub fn evaluate_rules<R, S>(
        &self,
        stratum: usize,
        rules: &[R],
        store: &mut S,
        engine: &dyn DataflowEngine,
        limits: EvaluationLimits,
    ) -> Result<StratumReport>
    where
        R: EvaluableRule,
        S: FactSource + FactSink,
    {
        let _span = info_span!("stratum", stratum, strategy = self.name()).entered();
        info!(stratum, rules = rules.len(), strategy = self.name(), "stratum_start");

        let report = match self {
            Evaluator::Naive => naive::evaluate(stratum, rules, store, engine, limits)?,
            Evaluator::DependencyAware => {
                dependency::evaluate(stratum, rules, store, engine, limits)?
            }
        };

        info!(
            stratum,
            iterations = report.iterations,
            new_facts = report.new_facts,
            "stratum_done"
        );
        Ok(report)
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
