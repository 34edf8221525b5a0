//! Naive fixpoint: every rule, every round, until a round derives nothing

use tracing::{debug, warn};

use super::{EvaluationLimits, StratumReport};
use crate::context::EvaluationContext;
use crate::dataflow::DataflowEngine;
use crate::error::Result;
use crate::rule_compiler::{EvaluableRule, RuleInput};
use crate::storage::{FactSink, FactSource};

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

    loop {
        let round = report.iterations;
        let mut added_this_round = 0;
        let mut ran = 0;

        for (index, rule) in rules.iter().enumerate() {
            if !limits.allows(report.evaluations[index]) {
                continue;
            }
            let ctx = EvaluationContext::new(stratum, round, index);
            let output = rule.evaluate(&ctx, &RuleInput::new(&*store, engine))?;
            report.evaluations[index] += 1;
            ran += 1;

            let added = report.absorb(store, rule.head_predicate(), output)?;
            debug!(
                stratum,
                iteration = round,
                rule = index,
                head = %rule.head_predicate(),
                new = added.len(),
                "rule_fired"
            );
            added_this_round += added.len();
        }

        if ran > 0 {
            report.iterations += 1;
        }
        if added_this_round == 0 {
            break;
        }
        if !report.evaluations.iter().any(|&n| limits.allows(n)) {
            warn!(
                stratum,
                cap = limits.max_rule_evaluations,
                "rule_evaluation_cap_reached"
            );
            break;
        }
    }

    Ok(report)
}
