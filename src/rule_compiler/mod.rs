//! # Rule Compiler
//!
//! Turns one (already reordered) rule into a chain of operators, one per
//! body literal plus the head substitution:
//!
//! ```text
//! p(X, Y) :- q(X, Y), r(Y, Z), NOT s(X, Z).
//!
//!   seed () -> join q -> (X, Y) -> join r -> (X, Y, Z) -> antijoin s -> substitute -> (X, Y)
//! ```
//!
//! Each operator is submitted to the [`DataflowEngine`] as its own job. The
//! running relation starts as the single empty tuple and evaluation stops as
//! soon as an operator produces nothing.

use std::collections::HashMap;
use std::fmt;
use tracing::{debug_span, trace};

use crate::ast::{Predicate, Rule};
use crate::builtins::Builtin;
use crate::context::EvaluationContext;
use crate::dataflow::{DataflowEngine, DataflowJob, SinkBinding};
use crate::error::{EngineError, Result};
use crate::safety::validate_rule;
use crate::storage::FactSource;
use crate::value::Relation;

pub mod operators;

pub use operators::{Operator, OperatorKind, RUNNING, SOURCE};

/// Where a compiled rule reads facts from and where it runs
#[derive(Clone, Copy)]
pub struct RuleInput<'a> {
    pub facts: &'a dyn FactSource,
    pub engine: &'a dyn DataflowEngine,
}

impl<'a> RuleInput<'a> {
    pub fn new(facts: &'a dyn FactSource, engine: &'a dyn DataflowEngine) -> Self {
        RuleInput { facts, engine }
    }
}

/// What the evaluators need from a rule
pub trait EvaluableRule {
    fn head_predicate(&self) -> &Predicate;

    /// Predicates whose new tuples can make this rule derive more
    fn body_predicates(&self) -> Vec<Predicate>;

    /// Evaluate against the full fact store
    fn evaluate(&self, ctx: &EvaluationContext, input: &RuleInput<'_>) -> Result<Relation>;

    /// Evaluate once per body literal with pending deltas, reading only the
    /// delta for that literal, and union the results
    fn evaluate_iteratively(
        &self,
        ctx: &EvaluationContext,
        input: &RuleInput<'_>,
        deltas: &HashMap<Predicate, Relation>,
    ) -> Result<Relation>;
}

/// A rule compiled to an operator chain
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Rule,
    operators: Vec<Operator>,
}

/// Compile a rule in its current body order
pub fn compile_rule(rule: &Rule) -> Result<CompiledRule> {
    validate_rule(rule)?;

    let mut schema: Vec<String> = Vec::new();
    let mut compiled = Vec::with_capacity(rule.body.len() + 1);
    for literal in &rule.body {
        let op = match (Builtin::of_literal(literal), literal.positive) {
            (Some(builtin), positive) => {
                operators::builtin(rule, &schema, builtin, &literal.atom, !positive)?
            }
            (None, true) => operators::join(&schema, &literal.atom)?,
            (None, false) => operators::antijoin(rule, &schema, &literal.atom)?,
        };
        schema.clone_from(&op.schema);
        compiled.push(op);
    }
    compiled.push(operators::substitute(rule, &schema)?);

    Ok(CompiledRule {
        rule: rule.clone(),
        operators: compiled,
    })
}

impl CompiledRule {
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Operator graphs in evaluation order
    pub fn explain(&self) -> String {
        let mut out = format!("{}\n", self.rule);
        for (i, op) in self.operators.iter().enumerate() {
            out.push_str(&format!("[{i}] {op}\n{}", op.graph));
        }
        out
    }

    /// Run the chain, reading `delta` instead of the store at one operator
    fn run_chain(
        &self,
        ctx: &EvaluationContext,
        input: &RuleInput<'_>,
        delta: Option<(usize, &Relation)>,
    ) -> Result<Relation> {
        let mut running = Relation::seed();
        let suffix = delta.map_or(String::new(), |(d, _)| format!("_d{d}"));

        for (i, op) in self.operators.iter().enumerate() {
            let sink = SinkBinding::named(&format!(
                "{}{}{suffix}_o{i}",
                self.rule.head.predicate.symbol,
                ctx.flow_id()
            ));
            let mut job = DataflowJob::new(op.graph.clone(), sink).bind(RUNNING, running);
            if let Some(predicate) = op.source() {
                let facts = match delta {
                    Some((d, tuples)) if d == i => tuples.clone(),
                    _ => input.facts.scan(predicate)?,
                };
                job = job.bind(SOURCE, facts);
            }

            running = input
                .engine
                .run(job)
                .map_err(|e| EngineError::evaluation(format!("{op} ({ctx})"), e))?;
            trace!(operator = i, kind = %op, rows = running.len(), "operator_done");

            if running.is_empty() {
                return Ok(Relation::new());
            }
        }
        Ok(running)
    }
}

impl EvaluableRule for CompiledRule {
    fn head_predicate(&self) -> &Predicate {
        self.rule.head_predicate()
    }

    fn body_predicates(&self) -> Vec<Predicate> {
        let mut out: Vec<Predicate> = Vec::new();
        for op in self.operators.iter().filter(|op| op.accepts_delta()) {
            if let Some(p) = op.source() {
                if !out.contains(p) {
                    out.push(p.clone());
                }
            }
        }
        out
    }

    fn evaluate(&self, ctx: &EvaluationContext, input: &RuleInput<'_>) -> Result<Relation> {
        let _span = debug_span!(
            "rule_eval",
            stratum = ctx.stratum,
            iteration = ctx.iteration,
            rule = ctx.rule,
            head = %self.rule.head.predicate
        )
        .entered();
        self.run_chain(ctx, input, None)
    }

    fn evaluate_iteratively(
        &self,
        ctx: &EvaluationContext,
        input: &RuleInput<'_>,
        deltas: &HashMap<Predicate, Relation>,
    ) -> Result<Relation> {
        let _span = debug_span!(
            "rule_eval_delta",
            stratum = ctx.stratum,
            iteration = ctx.iteration,
            rule = ctx.rule,
            head = %self.rule.head.predicate
        )
        .entered();

        let mut out = Relation::new();
        for (i, op) in self.operators.iter().enumerate() {
            if !op.accepts_delta() {
                continue;
            }
            let Some(delta) = op
                .source()
                .and_then(|p| deltas.get(p))
                .filter(|d| !d.is_empty())
            else {
                continue;
            };
            out.union_with(self.run_chain(ctx, input, Some((i, delta)))?);
        }
        Ok(out)
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops: Vec<String> = self.operators.iter().map(ToString::to_string).collect();
        write!(f, "{} => [{}]", self.rule.head, ops.join(", "))
    }
}
