//! Builder Patterns for AST Construction
//!
//! Provides fluent APIs for constructing AST nodes, particularly useful for tests.
//!
//! ## Example
//!
//! ```rust
//! use reasonflow::ast::builders::{AtomBuilder, RuleBuilder};
//!
//! // Build an atom: path(X, Y)
//! let atom = AtomBuilder::new("path").var("X").var("Y").build();
//! assert_eq!(atom.arity(), 2);
//!
//! // Build a recursive rule: path(X, Z) :- path(X, Y), edge(Y, Z).
//! let recursive = RuleBuilder::new("path")
//!     .head_vars(["X", "Z"])
//!     .body_atom("path", ["X", "Y"])
//!     .body_atom("edge", ["Y", "Z"])
//!     .build();
//! assert!(recursive.is_recursive());
//! ```

use super::{Atom, Literal, Rule, Term};

// AtomBuilder
/// Builder for constructing Atom instances
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    symbol: String,
    terms: Vec<Term>,
}

impl AtomBuilder {
    pub fn new(symbol: &str) -> Self {
        AtomBuilder {
            symbol: symbol.to_string(),
            terms: Vec::new(),
        }
    }

    pub fn var(mut self, name: &str) -> Self {
        self.terms.push(Term::var(name));
        self
    }

    pub fn int(mut self, value: i64) -> Self {
        self.terms.push(Term::int(value));
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        self.terms.push(Term::string(value));
        self
    }

    pub fn term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    pub fn build(self) -> Atom {
        Atom::new(&self.symbol, self.terms)
    }
}

// RuleBuilder
/// Builder for constructing Rule instances
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    head: AtomBuilder,
    body: Vec<Literal>,
}

impl RuleBuilder {
    pub fn new(head_symbol: &str) -> Self {
        RuleBuilder {
            head: AtomBuilder::new(head_symbol),
            body: Vec::new(),
        }
    }

    pub fn head_vars<'a>(mut self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        for v in vars {
            self.head = self.head.var(v);
        }
        self
    }

    pub fn head_term(mut self, term: Term) -> Self {
        self.head = self.head.term(term);
        self
    }

    /// Positive body atom over variables only
    pub fn body_atom<'a>(mut self, symbol: &str, vars: impl IntoIterator<Item = &'a str>) -> Self {
        let atom = Atom::new(symbol, vars.into_iter().map(Term::var).collect());
        self.body.push(Literal::positive(atom));
        self
    }

    /// Negated body atom over variables only
    pub fn negated_atom<'a>(
        mut self,
        symbol: &str,
        vars: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let atom = Atom::new(symbol, vars.into_iter().map(Term::var).collect());
        self.body.push(Literal::negative(atom));
        self
    }

    pub fn literal(mut self, literal: Literal) -> Self {
        self.body.push(literal);
        self
    }

    pub fn build(self) -> Rule {
        Rule::new(self.head.build(), self.body)
    }
}

/// Ground fact over integer constants: `fact("edge", &[1, 2])`
pub fn fact(symbol: &str, values: &[i64]) -> Rule {
    Rule::fact(Atom::new(
        symbol,
        values.iter().copied().map(Term::int).collect(),
    ))
}
