//! Rule benchmarks: join planning, single-rule evaluation, recursive closure.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reasonflow::ast::builders::{fact, RuleBuilder};
use reasonflow::storage::MemoryStore;
use reasonflow::{
    compile_rule, Config, EvaluableRule, EvaluationContext, FactSink, JoinPlanner, Predicate,
    Reasoner, Relation, Rule, RuleInput, TimelyEngine, Tuple,
};
use std::time::Duration;

/// `out(V0, .., Vn) :- r0(V0, V1), r1(V1, V2), ..` listed back to front
fn chain_rule(width: usize) -> Rule {
    let vars: Vec<String> = (0..=width).map(|i| format!("V{i}")).collect();
    let mut builder = RuleBuilder::new("out").head_vars(vars.iter().map(String::as_str));
    for i in (0..width).rev() {
        builder = builder.body_atom(&format!("r{i}"), [vars[i].as_str(), vars[i + 1].as_str()]);
    }
    builder.build()
}

fn closure_program() -> Vec<Rule> {
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

fn bench_join_planning(c: &mut Criterion) {
    let planner = JoinPlanner::new();

    let mut group = c.benchmark_group("join_planning");
    for width in [3usize, 5, 7] {
        let rule = chain_rule(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &rule, |b, rule| {
            b.iter(|| planner.plan_rule(black_box(rule)));
        });
    }
    group.finish();
}

fn bench_two_way_join(c: &mut Criterion) {
    let engine = TimelyEngine::new(2);
    let rule = compile_rule(&chain_rule(2)).unwrap();

    let mut group = c.benchmark_group("two_way_join");
    for size in [100i64, 1_000] {
        let mut store = MemoryStore::new();
        for symbol in ["r0", "r1"] {
            let rows: Relation = (0..size).map(|i| Tuple::ints(&[i, i + 1])).collect();
            store.insert(&Predicate::new(symbol, 2), rows).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let input = RuleInput::new(&store, &engine);
            b.iter(|| rule.evaluate(&EvaluationContext::default(), &input).unwrap());
        });
    }
    group.finish();
}

fn bench_recursive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive_closure");
    for size in [20i64, 50] {
        let edges: Vec<Rule> = (1..size).map(|i| fact("edge", &[i, i + 1])).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut config = Config::in_memory();
                config.evaluation.workers = 2;
                let mut reasoner = Reasoner::new(config).unwrap();
                reasoner.import_facts(&edges).unwrap();
                reasoner.evaluate(&closure_program()).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_join_planning, bench_two_way_join, bench_recursive_closure
}
criterion_main!(benches);
