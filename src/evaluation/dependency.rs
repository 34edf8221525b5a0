//! Dependency-aware fixpoint
//!
//! A seed round evaluates every rule against the full store. From then on a
//! worklist holds the rules whose body reads a predicate that grew, each with
//! the tuples that are new to it. A rule that is already waiting merges the
//! new tuples into its pending delta instead of being queued twice.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use super::{EvaluationLimits, StratumReport};
use crate::ast::Predicate;
use crate::context::EvaluationContext;
use crate::dataflow::DataflowEngine;
use crate::error::Result;
use crate::rule_compiler::{EvaluableRule, RuleInput};
use crate::storage::{FactSink, FactSource};
use crate::value::Relation;

type Deltas = HashMap<Predicate, Relation>;

struct Worklist {
    queue: VecDeque<usize>,
    pending: HashMap<usize, Deltas>,
}

impl Worklist {
    fn new() -> Self {
        Worklist {
            queue: VecDeque::new(),
            pending: HashMap::new(),
        }
    }

    fn schedule(&mut self, rule: usize, predicate: &Predicate, added: &Relation) {
        let deltas = self.pending.entry(rule).or_insert_with(|| {
            self.queue.push_back(rule);
            Deltas::new()
        });
        deltas
            .entry(predicate.clone())
            .or_default()
            .union_with(added.clone());
    }

    fn pop(&mut self) -> Option<(usize, Deltas)> {
        let rule = self.queue.pop_front()?;
        let deltas = self.pending.remove(&rule).unwrap_or_default();
        Some((rule, deltas))
    }
}

pub(crate) fn evaluate<R, S>(
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
    let mut report = StratumReport::new(stratum, rules.len());
    let readers: Vec<Vec<Predicate>> = rules.iter().map(EvaluableRule::body_predicates).collect();
    let mut worklist = Worklist::new();

    // Seed round
    for (index, rule) in rules.iter().enumerate() {
        if !limits.allows(report.evaluations[index]) {
            continue;
        }
        let ctx = EvaluationContext::new(stratum, 0, index);
        let output = rule.evaluate(&ctx, &RuleInput::new(&*store, engine))?;
        report.evaluations[index] += 1;
        let added = report.absorb(store, rule.head_predicate(), output)?;
        debug!(stratum, rule = index, new = added.len(), "rule_seeded");
        schedule_readers(
            &mut worklist,
            &readers,
            &report,
            limits,
            rule.head_predicate(),
            &added,
        );
    }
    report.iterations = 1;

    while let Some((index, deltas)) = worklist.pop() {
        let rule = &rules[index];
        let ctx = EvaluationContext::new(stratum, report.iterations, index);
        let output = rule.evaluate_iteratively(&ctx, &RuleInput::new(&*store, engine), &deltas)?;
        report.evaluations[index] += 1;
        report.iterations += 1;

        let added = report.absorb(store, rule.head_predicate(), output)?;
        debug!(
            stratum,
            iteration = ctx.iteration,
            rule = index,
            delta_predicates = deltas.len(),
            new = added.len(),
            "rule_fired"
        );
        schedule_readers(
            &mut worklist,
            &readers,
            &report,
            limits,
            rule.head_predicate(),
            &added,
        );
    }

    Ok(report)
}

/// Queue every rule reading `head` with the tuples just added to it
fn schedule_readers(
    worklist: &mut Worklist,
    readers: &[Vec<Predicate>],
    report: &StratumReport,
    limits: EvaluationLimits,
    head: &Predicate,
    added: &Relation,
) {
    if added.is_empty() {
        return;
    }
    for (index, body) in readers.iter().enumerate() {
        if !body.contains(head) {
            continue;
        }
        if !limits.allows(report.evaluations[index]) {
            warn!(
                stratum = report.stratum,
                rule = index,
                cap = limits.max_rule_evaluations,
                "rule_evaluation_cap_reached"
            );
            continue;
        }
        worklist.schedule(index, head, added);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{FailingRule, ScriptedRule};
    use super::super::Evaluator;
    use super::*;
    use crate::dataflow::TimelyEngine;
    use crate::error::EngineError;
    use crate::storage::MemoryStore;

    fn run(rules: &[ScriptedRule], cap: usize) -> StratumReport {
        let mut store = MemoryStore::new();
        let engine = TimelyEngine::new(1);
        Evaluator::DependencyAware
            .evaluate_rules(0, rules, &mut store, &engine, EvaluationLimits::new(cap))
            .unwrap()
    }

    #[test]
    fn test_unrelated_rules_run_once() {
        let rules = vec![
            ScriptedRule::new("a", &["x"], 3),
            ScriptedRule::new("b", &["y"], 3),
        ];
        let report = run(&rules, 0);
        assert_eq!(report.evaluations, vec![1, 1]);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn test_cap_blocks_rescheduling() {
        let rules = vec![ScriptedRule::new("grow", &["grow"], usize::MAX)];
        let report = run(&rules, 4);
        assert_eq!(report.evaluations, vec![4]);
        assert_eq!(report.derived[&Predicate::new("grow", 2)].len(), 4);
    }

    #[test]
    fn test_pending_rule_merges_deltas() {
        let mut worklist = Worklist::new();
        let p = Predicate::new("p", 1);
        let q = Predicate::new("q", 1);
        let one: Relation = [crate::value::Tuple::ints(&[1])].into_iter().collect();
        let two: Relation = [crate::value::Tuple::ints(&[2])].into_iter().collect();
        worklist.schedule(0, &p, &one);
        worklist.schedule(1, &p, &one);
        worklist.schedule(0, &p, &two);
        worklist.schedule(0, &q, &one);

        let (rule, deltas) = worklist.pop().unwrap();
        assert_eq!(rule, 0);
        assert_eq!(deltas[&p].len(), 2);
        assert_eq!(deltas[&q].len(), 1);
        assert_eq!(worklist.pop().unwrap().0, 1);
        assert!(worklist.pop().is_none());
    }

    #[test]
    fn test_error_aborts_stratum() {
        let rules = vec![FailingRule {
            head: Predicate::new("p", 1),
        }];
        let mut store = MemoryStore::new();
        let engine = TimelyEngine::new(1);
        assert!(matches!(
            Evaluator::DependencyAware.evaluate_rules(
                0,
                &rules,
                &mut store,
                &engine,
                EvaluationLimits::unlimited()
            ),
            Err(EngineError::Evaluation { .. })
        ));
    }
}
