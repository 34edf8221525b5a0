//! Per-literal operators
//!
//! Every operator reads the running relation under [`RUNNING`] and, for
//! relational literals, the literal's fact source under [`SOURCE`]. The
//! running relation's columns are the variables in `schema` order.

use std::fmt;

use crate::ast::{Atom, Predicate, Rule, Term};
use crate::builtins::Builtin;
use crate::error::{EngineError, Result};
use crate::ir::{BuiltinCall, ConstantFilter, Pattern, PlanNode, Template};

/// Binding name of the intermediate relation
pub const RUNNING: &str = "running";

/// Binding name of a literal's facts
pub const SOURCE: &str = "source";

/// What an operator does with the running relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorKind {
    /// Natural join with a positive literal's facts
    Join(Predicate),
    /// Antijoin with a negated literal's facts
    Antijoin(Predicate),
    Builtin(Builtin),
    /// Head substitution
    Substitute,
}

/// One compiled step of a rule body
#[derive(Debug, Clone)]
pub struct Operator {
    pub kind: OperatorKind,
    pub graph: PlanNode,
    /// Columns of the relation this operator produces; empty after the head
    /// substitution, whose output is shaped like the head tuple
    pub schema: Vec<String>,
}

impl Operator {
    /// Predicate whose facts are bound as [`SOURCE`]
    pub fn source(&self) -> Option<&Predicate> {
        match &self.kind {
            OperatorKind::Join(p) | OperatorKind::Antijoin(p) => Some(p),
            _ => None,
        }
    }

    /// Whether delta tuples may stand in for this operator's source
    pub fn accepts_delta(&self) -> bool {
        matches!(self.kind, OperatorKind::Join(_))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperatorKind::Join(p) => write!(f, "join {p}"),
            OperatorKind::Antijoin(p) => write!(f, "antijoin {p}"),
            OperatorKind::Builtin(b) => write!(f, "builtin {}", b.as_str()),
            OperatorKind::Substitute => write!(f, "substitute"),
        }
    }
}

/// Scan the source, keep tuples with the literal's constants, bind its variables
fn source_scan(atom: &Atom) -> Result<(PlanNode, Pattern)> {
    let filter = ConstantFilter::for_pattern(atom.terms())?;
    let mut node = PlanNode::input(SOURCE, atom.arity());
    if !filter.is_empty() {
        node = PlanNode::Filter {
            input: Box::new(node),
            filter,
        };
    }
    let pattern = Pattern::new(atom.terms().to_vec());
    let scan = PlanNode::Match {
        input: Box::new(node),
        pattern: pattern.clone(),
    };
    Ok((scan, pattern))
}

/// Key positions on both sides for the variables the pattern shares with `schema`
fn shared_keys(schema: &[String], pattern: &[String]) -> (Vec<usize>, Vec<usize>) {
    pattern
        .iter()
        .enumerate()
        .filter_map(|(r, var)| schema.iter().position(|s| s == var).map(|l| (l, r)))
        .unzip()
}

pub(crate) fn join(schema: &[String], atom: &Atom) -> Result<Operator> {
    let (scan, pattern) = source_scan(atom)?;
    let (left_keys, right_keys) = shared_keys(schema, pattern.schema());
    let right_keep: Vec<usize> = (0..pattern.schema().len())
        .filter(|i| !right_keys.contains(i))
        .collect();

    let mut out = schema.to_vec();
    out.extend(right_keep.iter().map(|&i| pattern.schema()[i].clone()));

    Ok(Operator {
        kind: OperatorKind::Join(atom.predicate.clone()),
        graph: PlanNode::Join {
            left: Box::new(PlanNode::input(RUNNING, schema.len())),
            right: Box::new(scan),
            left_keys,
            right_keys,
            right_keep,
        },
        schema: out,
    })
}

pub(crate) fn antijoin(rule: &Rule, schema: &[String], atom: &Atom) -> Result<Operator> {
    let (scan, pattern) = source_scan(atom)?;
    if let Some(var) = pattern.schema().iter().find(|v| !schema.contains(*v)) {
        return Err(EngineError::rule_safety(
            rule,
            format!("variable ?{var} of negated literal {atom} is not bound"),
        ));
    }
    let (left_keys, right_keys) = shared_keys(schema, pattern.schema());

    Ok(Operator {
        kind: OperatorKind::Antijoin(atom.predicate.clone()),
        graph: PlanNode::Antijoin {
            left: Box::new(PlanNode::input(RUNNING, schema.len())),
            right: Box::new(scan),
            left_keys,
            right_keys,
        },
        schema: schema.to_vec(),
    })
}

pub(crate) fn builtin(
    rule: &Rule,
    schema: &[String],
    builtin: Builtin,
    atom: &Atom,
    negated: bool,
) -> Result<Operator> {
    let unbound: Vec<usize> = atom
        .terms()
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.variables()
                .iter()
                .any(|v| !schema.iter().any(|s| s.as_str() == *v))
        })
        .map(|(i, _)| i)
        .collect();

    if unbound.len() > 1 {
        return Err(EngineError::BuiltinArity(format!(
            "{atom} in rule '{rule}' has {} unbound arguments",
            unbound.len()
        )));
    }

    let output = match unbound.first() {
        None => None,
        Some(_) if negated => {
            return Err(EngineError::rule_safety(
                rule,
                format!("negated builtin {atom} has an unbound argument"),
            ));
        }
        Some(&position) => match &atom.terms()[position] {
            Term::Variable(var) if builtin.can_bind(position) => Some(var.clone()),
            _ => {
                return Err(EngineError::rule_safety(
                    rule,
                    format!("{atom} cannot bind argument {position} of {}", builtin.as_str()),
                ));
            }
        },
    };

    let mut out = schema.to_vec();
    out.extend(output.iter().cloned());

    Ok(Operator {
        kind: OperatorKind::Builtin(builtin),
        graph: PlanNode::Builtin {
            input: Box::new(PlanNode::input(RUNNING, schema.len())),
            call: BuiltinCall {
                builtin,
                args: atom.terms().to_vec(),
                schema: schema.to_vec(),
                output,
                negated,
            },
        },
        schema: out,
    })
}

pub(crate) fn substitute(rule: &Rule, schema: &[String]) -> Result<Operator> {
    let template = Template::new(rule.head.terms().to_vec(), schema.to_vec());
    if let Some(var) = template.unbound_variables().first() {
        return Err(EngineError::rule_safety(
            rule,
            format!("head variable ?{var} is not bound by the body"),
        ));
    }
    Ok(Operator {
        kind: OperatorKind::Substitute,
        graph: PlanNode::Substitute {
            input: Box::new(PlanNode::input(RUNNING, schema.len())),
            template,
        },
        schema: Vec::new(),
    })
}
