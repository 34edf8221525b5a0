//! Rule Safety Validation
//!
//! A rule is safe when every variable it needs is bound somewhere a fact
//! tuple can supply it:
//!
//! - head variables are bound by a positive relational literal or by the
//!   single output of a builtin
//! - every variable of a negated literal is bound by the rest of the body
//! - a builtin is left with at most one unbound argument, and that argument
//!   sits at a position the builtin can compute
//!
//! Validation is order-independent; the join optimizer may reorder the body
//! afterwards and the compiler re-checks in evaluation order.

use std::collections::HashSet;

use crate::ast::{Atom, Literal, Rule};
use crate::builtins::Builtin;
use crate::error::{EngineError, Result};

/// Validate a single rule before compilation
pub fn validate_rule(rule: &Rule) -> Result<()> {
    let mut bound: HashSet<String> = HashSet::new();

    for lit in rule.positive_body() {
        if !Builtin::is_builtin(lit) {
            bound.extend(lit.variables().into_iter().map(str::to_string));
        }
    }

    // Builtins may bind their output, which may unlock further builtins
    let builtins: Vec<(&Literal, Builtin)> = rule
        .positive_body()
        .filter_map(|lit| Builtin::of_literal(lit).map(|b| (lit, b)))
        .collect();
    let mut pending: Vec<(&Literal, Builtin)> = builtins;
    loop {
        let before = pending.len();
        let mut still_pending = Vec::new();
        for (lit, builtin) in pending {
            let unbound = unbound_positions(&lit.atom, &bound);
            match unbound.as_slice() {
                [] => {}
                [position] if builtin.can_bind(*position) => {
                    if let Some(var) = lit.atom.terms()[*position].as_variable() {
                        bound.insert(var.to_string());
                    } else {
                        still_pending.push((lit, builtin));
                    }
                }
                _ => still_pending.push((lit, builtin)),
            }
        }
        pending = still_pending;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    if let Some((lit, builtin)) = pending.first() {
        let unbound = unbound_positions(&lit.atom, &bound);
        if unbound.len() > 1 {
            return Err(EngineError::BuiltinArity(format!(
                "{} in rule '{}' has {} unbound arguments",
                lit.atom,
                rule,
                unbound.len()
            )));
        }
        return Err(EngineError::rule_safety(
            rule,
            format!(
                "{} cannot bind argument {} of {}",
                lit.atom,
                unbound.first().copied().unwrap_or_default(),
                builtin.as_str()
            ),
        ));
    }

    for lit in rule.negated_body() {
        if let Some(var) = first_unbound(&lit.atom, &bound) {
            return Err(EngineError::rule_safety(
                rule,
                format!("variable ?{var} of negated literal {} is not bound", lit.atom),
            ));
        }
    }

    if let Some(var) = first_unbound(&rule.head, &bound) {
        return Err(EngineError::rule_safety(
            rule,
            format!("head variable ?{var} is not bound by the body"),
        ));
    }

    Ok(())
}

/// Validate every rule of a program
pub fn validate_program(rules: &[Rule]) -> Result<()> {
    rules.iter().try_for_each(validate_rule)
}

/// Argument positions of an atom that still contain an unbound variable
pub fn unbound_positions(atom: &Atom, bound: &HashSet<String>) -> Vec<usize> {
    atom.terms()
        .iter()
        .enumerate()
        .filter(|(_, term)| term.variables().iter().any(|v| !bound.contains(*v)))
        .map(|(i, _)| i)
        .collect()
}

fn first_unbound<'a>(atom: &'a Atom, bound: &HashSet<String>) -> Option<&'a str> {
    atom.variables().into_iter().find(|v| !bound.contains(*v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{AtomBuilder, RuleBuilder};
    use crate::ast::Term;

    #[test]
    fn test_safe_join_rule() {
        let rule = RuleBuilder::new("p")
            .head_vars(["X", "Y"])
            .body_atom("q", ["X", "Y"])
            .body_atom("r", ["Y", "Z"])
            .build();
        assert!(validate_rule(&rule).is_ok());
    }

    #[test]
    fn test_unbound_head_variable() {
        let rule = RuleBuilder::new("p")
            .head_vars(["X", "W"])
            .body_atom("q", ["X", "Y"])
            .build();
        let err = validate_rule(&rule).unwrap_err();
        assert!(matches!(err, EngineError::RuleSafety { .. }));
    }

    #[test]
    fn test_unbound_negated_variable() {
        let rule = RuleBuilder::new("p")
            .head_vars(["X"])
            .body_atom("q", ["X"])
            .negated_atom("r", ["X", "Y"])
            .build();
        assert!(matches!(
            validate_rule(&rule),
            Err(EngineError::RuleSafety { .. })
        ));
    }

    #[test]
    fn test_builtin_binds_head_variable() {
        let add = AtomBuilder::new("ADD").var("X").int(1).var("Y").build();
        let rule = RuleBuilder::new("succ")
            .head_vars(["X", "Y"])
            .body_atom("num", ["X"])
            .literal(Literal::positive(add))
            .build();
        assert!(validate_rule(&rule).is_ok());
    }

    #[test]
    fn test_chained_builtins() {
        // Y = X + 1, Z = Y + 1: the second builtin only becomes computable
        // after the first binds Y
        let first = AtomBuilder::new("add").var("X").int(1).var("Y").build();
        let second = AtomBuilder::new("add").var("Y").int(1).var("Z").build();
        let rule = RuleBuilder::new("p")
            .head_vars(["Z"])
            .literal(Literal::positive(second))
            .body_atom("num", ["X"])
            .literal(Literal::positive(first))
            .build();
        assert!(validate_rule(&rule).is_ok());
    }

    #[test]
    fn test_builtin_with_two_unbound_arguments() {
        let add = AtomBuilder::new("ADD").var("X").var("A").var("B").build();
        let rule = RuleBuilder::new("p")
            .head_vars(["X"])
            .body_atom("num", ["X"])
            .literal(Literal::positive(add))
            .build();
        assert!(matches!(
            validate_rule(&rule),
            Err(EngineError::BuiltinArity(_))
        ));
    }

    #[test]
    fn test_comparison_cannot_bind() {
        let less = AtomBuilder::new("LESS").var("X").var("Y").build();
        let rule = RuleBuilder::new("p")
            .head_vars(["X"])
            .body_atom("num", ["X"])
            .literal(Literal::positive(less))
            .build();
        assert!(matches!(
            validate_rule(&rule),
            Err(EngineError::RuleSafety { .. })
        ));
    }

    #[test]
    fn test_ground_fact_is_safe_and_open_fact_is_not() {
        assert!(validate_rule(&Rule::fact(Atom::new("e", vec![Term::int(1)]))).is_ok());
        assert!(validate_rule(&Rule::fact(Atom::new("e", vec![Term::var("X")]))).is_err());
    }
}
