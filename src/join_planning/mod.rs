//! # Join Planning
//!
//! Reorders a rule's body literals to keep intermediate relations small.
//!
//! 1. Take the positive relational literals of the body
//! 2. Search every ordering depth-first, scoring each step against the
//!    variables bound so far: `+shared * depth` when the literal shares
//!    variables with the frontier, `-depth` when it would force a cross
//!    product
//! 3. Keep the highest-scoring complete ordering (first found wins ties)
//! 4. Re-insert negated and builtin literals at the earliest point their
//!    inputs are bound, in input order where bindings allow
//!
//! ```text
//! Rule -> [Join Planning] -> Rule with reordered body -> Rule Compiler
//! ```
//!
//! The search is exhaustive and therefore factorial in the number of
//! positive literals; bodies above `max_permutation_literals` keep their
//! input order.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::ast::{Literal, Rule};
use crate::builtins::Builtin;
use crate::safety::unbound_positions;

/// Statistics about one planning run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlanningStats {
    /// Positive relational literals considered by the search
    pub num_literals: usize,
    /// Complete orderings scored
    pub paths_explored: usize,
    /// Score of the body in its input order
    pub input_score: i64,
    /// Score of the chosen order
    pub chosen_score: i64,
    /// Whether the chosen order differs from the input order
    pub reordered: bool,
}

/// Join planner for rule bodies
#[derive(Debug, Clone)]
pub struct JoinPlanner {
    /// Whether to enable join reordering
    enable_reordering: bool,
    /// Upper bound on positive literals for the exhaustive search
    max_permutation_literals: usize,
}

impl JoinPlanner {
    /// Create a new join planner
    pub fn new() -> Self {
        JoinPlanner {
            enable_reordering: true,
            max_permutation_literals: 8,
        }
    }

    pub fn with_max_permutation_literals(mut self, max: usize) -> Self {
        self.max_permutation_literals = max;
        self
    }

    /// Enable or disable join reordering
    pub fn set_reordering(&mut self, enable: bool) {
        self.enable_reordering = enable;
    }

    /// Plan the body order of a rule, returning a new rule
    pub fn plan_rule(&self, rule: &Rule) -> Rule {
        self.plan_with_stats(rule).0
    }

    /// Plan the body order and report how the search went
    pub fn plan_with_stats(&self, rule: &Rule) -> (Rule, JoinPlanningStats) {
        let (joinable, deferred): (Vec<&Literal>, Vec<&Literal>) = rule
            .body
            .iter()
            .partition(|lit| lit.positive && !Builtin::is_builtin(lit));

        let mut stats = JoinPlanningStats {
            num_literals: joinable.len(),
            input_score: path_score(&joinable, &(0..joinable.len()).collect::<Vec<_>>()),
            ..JoinPlanningStats::default()
        };
        stats.chosen_score = stats.input_score;

        if !self.enable_reordering || rule.body.len() <= 1 {
            return (rule.clone(), stats);
        }
        if joinable.len() > self.max_permutation_literals {
            warn!(
                rule = %rule,
                literals = joinable.len(),
                max = self.max_permutation_literals,
                "join_planning_skipped"
            );
            return (rule.clone(), stats);
        }

        let mut search = PathSearch::new(&joinable);
        search.explore();
        stats.paths_explored = search.paths_explored;
        stats.chosen_score = search.best_score;

        let ordered: Vec<&Literal> = search.best.iter().map(|&i| joinable[i]).collect();
        let body = interleave(&ordered, &deferred);
        stats.reordered = body != rule.body;

        debug!(
            rule = %rule,
            paths = stats.paths_explored,
            score = stats.chosen_score,
            reordered = stats.reordered,
            "join_order_planned"
        );
        (rule.with_body(body), stats)
    }

    /// Analyze a rule body without producing a new rule
    pub fn analyze(&self, rule: &Rule) -> JoinPlanningStats {
        self.plan_with_stats(rule).1
    }
}

impl Default for JoinPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first search over all orderings of the joinable literals
struct PathSearch<'a> {
    literals: Vec<HashSet<&'a str>>,
    best: Vec<usize>,
    best_score: i64,
    paths_explored: usize,
}

impl<'a> PathSearch<'a> {
    fn new(literals: &[&'a Literal]) -> Self {
        PathSearch {
            literals: literals
                .iter()
                .map(|lit| lit.variables().into_iter().collect())
                .collect(),
            best: (0..literals.len()).collect(),
            best_score: i64::MIN,
            paths_explored: 0,
        }
    }

    fn explore(&mut self) {
        let mut path = Vec::with_capacity(self.literals.len());
        let mut used = vec![false; self.literals.len()];
        self.step(&mut path, &mut used, &HashSet::new(), 0);
    }

    fn step(
        &mut self,
        path: &mut Vec<usize>,
        used: &mut Vec<bool>,
        bound: &HashSet<&'a str>,
        score: i64,
    ) {
        if path.len() == self.literals.len() {
            self.paths_explored += 1;
            if score > self.best_score {
                self.best_score = score;
                self.best = path.clone();
            }
            return;
        }

        let depth = path.len() as i64 + 1;
        for i in 0..self.literals.len() {
            if used[i] {
                continue;
            }
            let vars = &self.literals[i];
            let step_score = step_score(vars, bound, depth);

            let mut next_bound = bound.clone();
            next_bound.extend(vars.iter().copied());
            used[i] = true;
            path.push(i);
            self.step(path, used, &next_bound, score + step_score);
            path.pop();
            used[i] = false;
        }
    }
}

fn step_score(vars: &HashSet<&str>, bound: &HashSet<&str>, depth: i64) -> i64 {
    let shared = vars.intersection(bound).count() as i64;
    if shared > 0 {
        shared * depth
    } else {
        -depth
    }
}

/// Score of one fixed ordering
fn path_score(literals: &[&Literal], order: &[usize]) -> i64 {
    let mut bound: HashSet<&str> = HashSet::new();
    let mut score = 0;
    for (step, &i) in order.iter().enumerate() {
        let vars: HashSet<&str> = literals[i].variables().into_iter().collect();
        score += step_score(&vars, &bound, step as i64 + 1);
        bound.extend(vars);
    }
    score
}

/// Merge deferred literals into the ordered joins as early as their inputs
/// allow; among literals that become placeable together the input order wins
fn interleave(ordered: &[&Literal], deferred: &[&Literal]) -> Vec<Literal> {
    let mut body = Vec::with_capacity(ordered.len() + deferred.len());
    let mut bound: HashSet<String> = HashSet::new();
    let mut pending: Vec<&Literal> = deferred.to_vec();

    place_ready(&mut pending, &mut bound, &mut body);
    for lit in ordered {
        bound.extend(lit.variables().into_iter().map(str::to_string));
        body.push((*lit).clone());
        place_ready(&mut pending, &mut bound, &mut body);
    }
    body.extend(pending.into_iter().cloned());
    body
}

fn place_ready(pending: &mut Vec<&Literal>, bound: &mut HashSet<String>, body: &mut Vec<Literal>) {
    while let Some(pos) = pending.iter().position(|lit| placeable(lit, bound)) {
        let lit = pending.remove(pos);
        if lit.positive {
            bound.extend(lit.variables().into_iter().map(str::to_string));
        }
        body.push(lit.clone());
    }
}

fn placeable(lit: &Literal, bound: &HashSet<String>) -> bool {
    let unbound = unbound_positions(&lit.atom, bound);
    if !lit.positive {
        return unbound.is_empty();
    }
    match (Builtin::of_literal(lit), unbound.as_slice()) {
        (_, []) => true,
        (Some(builtin), [position]) => {
            builtin.can_bind(*position) && lit.atom.terms()[*position].is_variable()
        }
        _ => false,
    }
}
