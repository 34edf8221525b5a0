//! # Reasoner
//!
//! Program-level driver tying the pipeline together:
//!
//! ```text
//! rules -> validate -> stratify -> per stratum: plan joins -> compile -> evaluate
//! ```
//!
//! Stratum `k` sees every fact derived by strata `0..k`. The reasoner owns
//! the fact store and the dataflow engine for its lifetime; per-program
//! predicate counts live in a [`ProgramContext`] reset on every `evaluate`.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::ast::{Atom, Literal, Predicate, Rule};
use crate::config::Config;
use crate::context::{EvaluationContext, ProgramContext};
use crate::dataflow::{DataflowEngine, TimelyEngine};
use crate::error::{EngineError, Result};
use crate::evaluation::{EvaluationLimits, Evaluator, StratumReport};
use crate::join_planning::JoinPlanner;
use crate::rule_compiler::{compile_rule, CompiledRule, EvaluableRule, RuleInput};
use crate::safety::validate_program;
use crate::storage::{FactSource, FactStore};
use crate::stratifier::stratify;
use crate::value::{Relation, Tuple};

/// Head symbol of compiled queries
const QUERY_SYMBOL: &str = "__query";

/// Outcome of one program evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub strata: Vec<StratumReport>,
}

impl EvaluationReport {
    pub fn new_facts(&self) -> usize {
        self.strata.iter().map(|s| s.new_facts).sum()
    }

    pub fn rule_evaluations(&self) -> usize {
        self.strata.iter().flat_map(|s| &s.evaluations).sum()
    }
}

/// Evaluates Datalog programs over a fact store
pub struct Reasoner {
    config: Config,
    store: FactStore,
    engine: Box<dyn DataflowEngine>,
    planner: JoinPlanner,
    evaluator: Evaluator,
    program: ProgramContext,
}

impl Reasoner {
    /// Build a reasoner on the in-process timely engine
    pub fn new(config: Config) -> Result<Self> {
        let engine = Box::new(TimelyEngine::new(config.evaluation.workers));
        Reasoner::with_engine(config, engine)
    }

    /// Build a reasoner on a specific dataflow engine
    pub fn with_engine(config: Config, engine: Box<dyn DataflowEngine>) -> Result<Self> {
        let evaluator = Evaluator::from_strategy(&config.evaluation.strategy)?;
        if config.storage.partition_block_size <= 0 {
            return Err(EngineError::Configuration(format!(
                "partition_block_size must be positive, got {}",
                config.storage.partition_block_size
            )));
        }
        let store = FactStore::from_config(&config.storage)?;

        let mut planner = JoinPlanner::new()
            .with_max_permutation_literals(config.evaluation.max_join_permutation_literals);
        planner.set_reordering(config.evaluation.enable_join_optimization);

        info!(
            backend = ?config.storage.backend,
            strategy = evaluator.name(),
            workers = config.evaluation.workers,
            "reasoner_ready"
        );
        Ok(Reasoner {
            config,
            store,
            engine,
            planner,
            evaluator,
            program: ProgramContext::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn facts(&self) -> &FactStore {
        &self.store
    }

    pub fn evaluator(&self) -> Evaluator {
        self.evaluator
    }

    /// Predicate counts observed during the last `evaluate`
    pub fn program_context(&self) -> &ProgramContext {
        &self.program
    }

    /// Import one batch of base facts, returning how many were new
    pub fn import_batch(&mut self, batch: BTreeMap<Predicate, Relation>) -> Result<usize> {
        Ok(self.store.import_batch(batch)?)
    }

    /// Import ground fact rules as one batch
    pub fn import_facts(&mut self, facts: &[Rule]) -> Result<usize> {
        let mut batch: BTreeMap<Predicate, Relation> = BTreeMap::new();
        for fact in facts {
            if !fact.is_fact() || !fact.head.is_ground() {
                return Err(EngineError::rule_safety(fact, "only ground facts can be imported"));
            }
            batch
                .entry(fact.head.predicate.clone())
                .or_default()
                .insert(fact.head.tuple.clone());
        }
        self.import_batch(batch)
    }

    /// Plan and compile one rule the way `evaluate` does
    pub fn compile(&self, rule: &Rule) -> Result<CompiledRule> {
        compile_rule(&self.planner.plan_rule(rule))
    }

    /// Evaluate a program to a fixpoint, stratum by stratum
    pub fn evaluate(&mut self, rules: &[Rule]) -> Result<EvaluationReport> {
        validate_program(rules)?;
        let stratification = stratify(rules)?;
        let limits = EvaluationLimits::new(self.config.evaluation.max_rule_evaluations);

        self.program = ProgramContext::new();
        for predicate in self.store.predicates() {
            let count = self.store.count(&predicate)?;
            self.program.record_count(&predicate, count);
        }

        info!(
            rules = rules.len(),
            strata = stratification.len(),
            strategy = self.evaluator.name(),
            "evaluation_start"
        );

        let mut report = EvaluationReport::default();
        for (stratum, stratum_rules) in stratification.into_strata().into_iter().enumerate() {
            if stratum_rules.is_empty() {
                continue;
            }
            let compiled: Vec<CompiledRule> = stratum_rules
                .iter()
                .map(|rule| self.compile(rule))
                .collect::<Result<_>>()?;

            let stratum_report = self.evaluator.evaluate_rules(
                stratum,
                &compiled,
                &mut self.store,
                self.engine.as_ref(),
                limits,
            )?;

            for (predicate, derived) in &stratum_report.derived {
                // Flow id names the first rule of the stratum deriving this predicate
                let rule = stratum_rules
                    .iter()
                    .position(|r| r.head_predicate() == predicate)
                    .unwrap_or_default();
                let ctx = EvaluationContext::new(stratum, stratum_report.iterations, rule);
                self.store.record_result(&predicate.symbol, &ctx, derived)?;
                self.program.add_count(predicate, derived.len());
            }
            report.strata.push(stratum_report);
        }

        info!(
            strata = report.strata.len(),
            new_facts = report.new_facts(),
            evaluations = report.rule_evaluations(),
            "evaluation_done"
        );
        Ok(report)
    }

    /// Tuples of the store matching an atom, shaped like the atom
    pub fn query(&self, atom: &Atom) -> Result<Relation> {
        let rule = Rule::new(
            Atom::new(QUERY_SYMBOL, atom.terms().to_vec()),
            vec![Literal::positive(atom.clone())],
        );
        let compiled = compile_rule(&rule)?;
        let out = compiled.evaluate(
            &EvaluationContext::default(),
            &RuleInput::new(&self.store, self.engine.as_ref()),
        )?;
        debug!(query = %atom, rows = out.len(), "query_done");
        Ok(out)
    }

    /// All stored tuples of a predicate
    pub fn relation(&self, predicate: &Predicate) -> Result<Vec<Tuple>> {
        Ok(self.store.scan(predicate)?.to_vec())
    }
}
