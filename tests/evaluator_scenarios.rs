//! Fixpoint evaluation counts for both strategies.

use std::cell::Cell;
use std::collections::HashMap;

use reasonflow::ast::builders::{fact, RuleBuilder};
use reasonflow::storage::MemoryStore;
use reasonflow::{
    compile_rule, Config, EvaluableRule, EvaluationContext, EvaluationLimits, Evaluator,
    FactSink, FactSource, Predicate, Reasoner, Relation, Result, RuleInput, Term, TimelyEngine,
    Tuple,
};

/// Derives one new tuple per evaluation until its `productive_until`-th call
struct CountingRule {
    head: Predicate,
    body: Vec<Predicate>,
    productive_until: usize,
    calls: Cell<usize>,
}

impl CountingRule {
    fn new(head: &str, body: &[&str], productive_until: usize) -> Self {
        CountingRule {
            head: Predicate::new(head, 2),
            body: body.iter().map(|b| Predicate::new(b, 2)).collect(),
            productive_until,
            calls: Cell::new(0),
        }
    }

    fn next(&self) -> Relation {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        if n >= self.productive_until {
            return Relation::new();
        }
        [Tuple::new(vec![Term::string(&self.head.symbol), Term::int(n as i64)])]
            .into_iter()
            .collect()
    }
}

impl EvaluableRule for CountingRule {
    fn head_predicate(&self) -> &Predicate {
        &self.head
    }

    fn body_predicates(&self) -> Vec<Predicate> {
        self.body.clone()
    }

    fn evaluate(&self, _ctx: &EvaluationContext, _input: &RuleInput<'_>) -> Result<Relation> {
        Ok(self.next())
    }

    fn evaluate_iteratively(
        &self,
        _ctx: &EvaluationContext,
        _input: &RuleInput<'_>,
        _deltas: &HashMap<Predicate, Relation>,
    ) -> Result<Relation> {
        Ok(self.next())
    }
}

#[test]
fn test_path_edge_cycle_evaluation_counts() {
    // path(X,Y) :- edge(X,Y).  edge(X,Y) :- path(X,Y).
    let rules = vec![
        CountingRule::new("path", &["edge"], 3),
        CountingRule::new("edge", &["path"], 3),
    ];
    let mut store = MemoryStore::new();
    let engine = TimelyEngine::new(1);
    let report = Evaluator::DependencyAware
        .evaluate_rules(0, &rules, &mut store, &engine, EvaluationLimits::new(3))
        .unwrap();

    assert_eq!(rules[0].calls.get(), 2, "path evaluations");
    assert_eq!(rules[1].calls.get(), 3, "edge evaluations");
    assert_eq!(report.evaluations, vec![2, 3]);
    assert_eq!(store.count(&Predicate::new("edge", 2)).unwrap(), 2);
}

#[test]
fn test_self_recursive_rule_evaluation_count() {
    // edge(X,Z) :- edge(X,Y), edge(Y,Z).
    let rules = vec![CountingRule::new("edge", &["edge"], 3)];
    let mut store = MemoryStore::new();
    let engine = TimelyEngine::new(1);
    let report = Evaluator::DependencyAware
        .evaluate_rules(0, &rules, &mut store, &engine, EvaluationLimits::new(3))
        .unwrap();

    assert_eq!(rules[0].calls.get(), 3);
    assert_eq!(report.new_facts, 2);
}

#[test]
fn test_naive_evaluates_every_rule_each_round() {
    let rules = vec![
        CountingRule::new("path", &["edge"], 3),
        CountingRule::new("edge", &["path"], 3),
    ];
    let mut store = MemoryStore::new();
    let engine = TimelyEngine::new(1);
    let report = Evaluator::Naive
        .evaluate_rules(0, &rules, &mut store, &engine, EvaluationLimits::new(3))
        .unwrap();
    assert_eq!(report.evaluations, vec![3, 3]);
}

fn closure_program() -> Vec<reasonflow::Rule> {
    vec![
        RuleBuilder::new("path")
            .head_vars(["X", "Y"])
            .body_atom("edge", ["X", "Y"])
            .build(),
        RuleBuilder::new("path")
            .head_vars(["X", "Z"])
            .body_atom("path", ["X", "Y"])
            .body_atom("edge", ["Y", "Z"])
            .build(),
    ]
}

fn chain(n: i64) -> Vec<reasonflow::Rule> {
    (1..n).map(|i| fact("edge", &[i, i + 1])).collect()
}

#[test]
fn test_strategies_agree_on_transitive_closure() {
    let mut results = Vec::new();
    for strategy in ["naive", "dependency"] {
        let mut config = Config::in_memory();
        config.evaluation.strategy = strategy.to_string();
        config.evaluation.workers = 2;
        let mut reasoner = Reasoner::new(config).unwrap();
        reasoner.import_facts(&chain(6)).unwrap();
        let report = reasoner.evaluate(&closure_program()).unwrap();
        assert_eq!(report.new_facts(), 15, "{strategy}");
        results.push(reasoner.relation(&Predicate::new("path", 2)).unwrap());
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_dependency_aware_uses_deltas_for_compiled_rules() {
    let rules: Vec<_> = closure_program()
        .iter()
        .map(|r| compile_rule(r).unwrap())
        .collect();
    let mut store = MemoryStore::new();
    let edges: Relation = (1..5).map(|i| Tuple::ints(&[i, i + 1])).collect();
    store.insert(&Predicate::new("edge", 2), edges).unwrap();
    let engine = TimelyEngine::new(1);

    let report = Evaluator::DependencyAware
        .evaluate_rules(0, &rules, &mut store, &engine, EvaluationLimits::unlimited())
        .unwrap();

    // Base rule runs once; the recursive rule once per path length plus the
    // delta round that finds nothing
    assert_eq!(report.evaluations[0], 1);
    assert_eq!(report.new_facts, 10);
    assert_eq!(store.count(&Predicate::new("path", 2)).unwrap(), 10);
}
