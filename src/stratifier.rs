//! # Stratification
//!
//! Partitions a rule set into strata so that every predicate a rule negates
//! is fully computed before the rule runs:
//!
//! ```text
//! stratum(head) >= stratum(body)   for positive body literals
//! stratum(head) >  stratum(body)   for negated body literals
//! ```
//!
//! The assignment is computed by relaxation: every predicate starts at 0 and
//! is raised until a full pass changes nothing. Strata can never legitimately
//! exceed the number of rules, so a predicate that climbs past that bound is
//! proof of a cycle through negation.
//!
//! ```datalog
//! reach(X)       :- source(X).
//! reach(Y)       :- reach(X), edge(X, Y).
//! unreachable(X) :- node(X), NOT reach(X).
//! ```
//!
//! puts both `reach` rules in stratum 0 and `unreachable` in stratum 1.

use std::collections::HashMap;
use tracing::debug;

use crate::ast::{Predicate, Rule};
use crate::error::{EngineError, Result};

/// Type of dependency between predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyType {
    /// Head depends on a positive body literal; same stratum or higher
    Positive,
    /// Head negates the body predicate; strictly higher stratum
    Negative,
}

/// One head-to-body edge, in rule and body order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub head: Predicate,
    pub body: Predicate,
    pub kind: DependencyType,
}

/// Predicate dependency graph of a rule set
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: Vec<Dependency>,
}

impl DependencyGraph {
    pub fn from_rules(rules: &[Rule]) -> Self {
        let mut graph = DependencyGraph::default();
        for rule in rules {
            for lit in &rule.body {
                let kind = if lit.positive {
                    DependencyType::Positive
                } else {
                    DependencyType::Negative
                };
                graph.add_edge(rule.head_predicate(), lit.predicate(), kind);
            }
        }
        graph
    }

    pub fn add_edge(&mut self, head: &Predicate, body: &Predicate, kind: DependencyType) {
        self.edges.push(Dependency {
            head: head.clone(),
            body: body.clone(),
            kind,
        });
    }

    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    /// Predicates that `head` negates
    pub fn negative_deps(&self, head: &Predicate) -> Vec<&Predicate> {
        self.edges
            .iter()
            .filter(|d| d.kind == DependencyType::Negative && &d.head == head)
            .map(|d| &d.body)
            .collect()
    }

    /// Heads whose rules read `predicate`, in first-appearance order
    pub fn dependents(&self, predicate: &Predicate) -> Vec<&Predicate> {
        let mut out: Vec<&Predicate> = Vec::new();
        for d in self.edges.iter().filter(|d| &d.body == predicate) {
            if !out.contains(&&d.head) {
                out.push(&d.head);
            }
        }
        out
    }
}

/// Check if a single rule is recursive (head predicate appears in its body)
pub fn is_recursive_rule(rule: &Rule) -> bool {
    rule.is_recursive()
}

/// Successful stratification
#[derive(Debug, Clone)]
pub struct Stratification {
    /// Rules per stratum, `0..=highest`; a stratum may be empty
    pub strata: Vec<Vec<Rule>>,
    assignment: HashMap<Predicate, usize>,
}

impl Stratification {
    /// Stratum of a predicate; unseen predicates (EDB) are in stratum 0
    pub fn stratum_of(&self, predicate: &Predicate) -> usize {
        self.assignment.get(predicate).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.strata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    pub fn into_strata(self) -> Vec<Vec<Rule>> {
        self.strata
    }
}

/// Stratify a rule set
pub fn stratify(rules: &[Rule]) -> Result<Stratification> {
    let rule_count = rules.len();
    let graph = DependencyGraph::from_rules(rules);
    let mut assignment: HashMap<Predicate, usize> = HashMap::new();

    let mut converged = false;
    for pass in 0..=rule_count {
        let mut changed = false;

        for dep in graph.edges() {
            let body_stratum = assignment.get(&dep.body).copied().unwrap_or(0);
            let required = match dep.kind {
                DependencyType::Positive => body_stratum,
                DependencyType::Negative => body_stratum + 1,
            };
            let head_stratum = assignment.entry(dep.head.clone()).or_insert(0);
            if *head_stratum < required {
                *head_stratum = required;
                changed = true;

                if required > rule_count {
                    return Err(EngineError::Stratification {
                        predicate: dep.head.to_string(),
                        stratum: required,
                        rule_count,
                    });
                }
            }
        }

        debug!(pass, changed, "stratify_pass");
        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        let (predicate, stratum) = assignment
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(p, s)| (p.to_string(), *s))
            .unwrap_or_default();
        return Err(EngineError::Stratification {
            predicate,
            stratum,
            rule_count,
        });
    }

    let highest = rules
        .iter()
        .map(|r| assignment.get(r.head_predicate()).copied().unwrap_or(0))
        .max()
        .unwrap_or(0);
    let len = if rules.is_empty() { 0 } else { highest + 1 };
    let mut strata: Vec<Vec<Rule>> = vec![Vec::new(); len];
    for rule in rules {
        let stratum = assignment.get(rule.head_predicate()).copied().unwrap_or(0);
        strata[stratum].push(rule.clone());
    }

    debug!(rules = rule_count, strata = strata.len(), "stratify_done");
    Ok(Stratification { strata, assignment })
}
