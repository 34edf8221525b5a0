//! # Term and Rule Model
//!
//! Immutable value types for Datalog programs: terms, predicates, atoms,
//! literals and rules. These are what a parser hands to the engine; every
//! later stage (stratifier, optimizer, compiler) produces new values rather
//! than mutating these in place.
//!
//! ## Builders
//!
//! For programmatic construction of rules, see the [`builders`] module
//! which provides fluent APIs like `AtomBuilder` and `RuleBuilder`.

use abomonation_derive::Abomonation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub mod builders;

use crate::value::Tuple;

// ============================================================================
// Terms
// ============================================================================

/// A constant value that can appear in a term
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Abomonation,
)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Functor of list terms (`list(a, b, c)`)
pub const LIST_FUNCTOR: &str = "list";

/// Represents a variable, a constant, or a constructed term in Datalog
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Abomonation,
)]
pub enum Term {
    Variable(String),
    Constant(Value),
    /// Functional term: `f(X, 1)`, `list(1, 2, 3)`
    Constructed { functor: String, args: Vec<Term> },
}

impl Term {
    pub fn var(name: &str) -> Self {
        Term::Variable(name.to_string())
    }

    pub fn int(v: i64) -> Self {
        Term::Constant(Value::Int(v))
    }

    pub fn string(s: &str) -> Self {
        Term::Constant(Value::Str(s.to_string()))
    }

    pub fn constructed(functor: &str, args: Vec<Term>) -> Self {
        Term::Constructed {
            functor: functor.to_string(),
            args,
        }
    }

    /// Build a list term from its elements
    pub fn list(items: Vec<Term>) -> Self {
        Term::constructed(LIST_FUNCTOR, items)
    }

    /// Check if this term is a variable
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    /// Get variable name if this is a variable
    pub fn as_variable(&self) -> Option<&str> {
        if let Term::Variable(name) = self {
            Some(name)
        } else {
            None
        }
    }

    /// Get the constant if this is a constant term
    pub fn as_value(&self) -> Option<&Value> {
        if let Term::Constant(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// A term is ground iff no variable is reachable from it
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Constant(_) => true,
            Term::Constructed { args, .. } => args.iter().all(Term::is_ground),
        }
    }

    /// Variables in first-appearance order, without duplicates
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Term::Variable(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Term::Constant(_) => {}
            Term::Constructed { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "?{name}"),
            Term::Constant(v) => write!(f, "{v}"),
            Term::Constructed { functor, args } => {
                write!(f, "{functor}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Predicates, atoms, literals
// ============================================================================

/// A predicate is identified by symbol AND arity: `p/1` and `p/2` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub symbol: String,
    pub arity: usize,
}

impl Predicate {
    pub fn new(symbol: &str, arity: usize) -> Self {
        Predicate {
            symbol: symbol.to_string(),
            arity,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.arity)
    }
}

/// Represents an atom like edge(x, y) or reach(x)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub predicate: Predicate,
    pub tuple: Tuple,
}

impl Atom {
    /// Create a new atom; the predicate arity is taken from the tuple
    pub fn new(symbol: &str, terms: Vec<Term>) -> Self {
        Atom {
            predicate: Predicate::new(symbol, terms.len()),
            tuple: Tuple::new(terms),
        }
    }

    pub fn terms(&self) -> &[Term] {
        self.tuple.terms()
    }

    /// Get the arity (number of arguments) of this atom
    pub fn arity(&self) -> usize {
        self.predicate.arity
    }

    /// Variables in first-appearance order
    pub fn variables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for term in self.terms() {
            for v in term.variables() {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    pub fn is_ground(&self) -> bool {
        self.terms().iter().all(Term::is_ground)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.predicate.symbol, self.tuple)
    }
}

/// A possibly negated atom. Negation is a flag, not a separate type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub positive: bool,
    pub atom: Atom,
}

impl Literal {
    pub fn positive(atom: Atom) -> Self {
        Literal {
            positive: true,
            atom,
        }
    }

    pub fn negative(atom: Atom) -> Self {
        Literal {
            positive: false,
            atom,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.atom.predicate
    }

    pub fn variables(&self) -> Vec<&str> {
        self.atom.variables()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            write!(f, "NOT ")?;
        }
        write!(f, "{}", self.atom)
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Represents a single Datalog rule with exactly one positive head atom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Literal>,
}

impl Rule {
    /// Create a new rule
    pub fn new(head: Atom, body: Vec<Literal>) -> Self {
        Rule { head, body }
    }

    /// Create a fact: a rule with an empty body
    pub fn fact(head: Atom) -> Self {
        Rule {
            head,
            body: Vec::new(),
        }
    }

    /// Returns a new rule with the same head and the given body
    pub fn with_body(&self, body: Vec<Literal>) -> Self {
        Rule {
            head: self.head.clone(),
            body,
        }
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    pub fn head_predicate(&self) -> &Predicate {
        &self.head.predicate
    }

    /// Check if this rule is recursive (head predicate appears in body)
    pub fn is_recursive(&self) -> bool {
        self.body
            .iter()
            .any(|lit| lit.predicate() == self.head_predicate())
    }

    /// Distinct body predicates in body order
    pub fn body_predicates(&self) -> Vec<&Predicate> {
        let mut seen = HashSet::new();
        self.body
            .iter()
            .map(Literal::predicate)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Get all positive body literals
    pub fn positive_body(&self) -> impl Iterator<Item = &Literal> {
        self.body.iter().filter(|lit| lit.positive)
    }

    /// Get all negated body literals
    pub fn negated_body(&self) -> impl Iterator<Item = &Literal> {
        self.body.iter().filter(|lit| !lit.positive)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, lit) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{lit}")?;
            }
        }
        write!(f, ".")
    }
}
