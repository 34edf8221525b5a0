//! # Tuples and Relations
//!
//! A [`Tuple`] is an ordered sequence of terms whose arity is fixed per
//! predicate. A [`Relation`] is a duplicate-free, ordered set of tuples; it is
//! what compiled rules produce and what fact stores hand out.
//!
//! Tuples flow through the dataflow engine, so they carry the traits
//! Differential Dataflow requires (`Ord`, `Hash`, `Abomonation`).

use abomonation_derive::Abomonation;
use serde::{Deserialize, Serialize};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;

use crate::ast::Term;

/// A positional tuple of terms
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Abomonation,
)]
pub struct Tuple {
    terms: Vec<Term>,
}

impl Tuple {
    /// Create a new tuple from a vector of terms
    pub fn new(terms: Vec<Term>) -> Self {
        Tuple { terms }
    }

    /// Create an empty (zero-column) tuple
    pub fn empty() -> Self {
        Tuple { terms: Vec::new() }
    }

    /// Tuple of integer constants
    pub fn ints(values: &[i64]) -> Self {
        Tuple::new(values.iter().copied().map(Term::int).collect())
    }

    /// Get the number of columns in this tuple
    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// Get a term by index
    pub fn get(&self, index: usize) -> Option<&Term> {
        self.terms.get(index)
    }

    /// Get all terms as a slice
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn into_terms(self) -> Vec<Term> {
        self.terms
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    /// Create a new tuple by selecting specific columns
    pub fn project(&self, indices: &[usize]) -> Self {
        let terms = indices
            .iter()
            .filter_map(|&i| self.terms.get(i).cloned())
            .collect();
        Tuple { terms }
    }

    /// Concatenate two tuples
    pub fn concat(&self, other: &Tuple) -> Self {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        Tuple { terms }
    }

    /// Append one term, returning the extended tuple
    pub fn with(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Term>> for Tuple {
    fn from(terms: Vec<Term>) -> Self {
        Tuple::new(terms)
    }
}

/// A set of tuples with set semantics and deterministic iteration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relation {
    tuples: BTreeSet<Tuple>,
}

impl Relation {
    pub fn new() -> Self {
        Relation::default()
    }

    /// The single-row, zero-column relation every rule evaluation starts from
    pub fn seed() -> Self {
        let mut tuples = BTreeSet::new();
        tuples.insert(Tuple::empty());
        Relation { tuples }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Insert a tuple; returns true if it was not present
    pub fn insert(&mut self, tuple: Tuple) -> bool {
        self.tuples.insert(tuple)
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.tuples.contains(tuple)
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    /// Add every tuple of `other`
    pub fn union_with(&mut self, other: Relation) {
        self.tuples.extend(other.tuples);
    }

    /// Tuples of `self` that are not in `other`
    pub fn difference(&self, other: &Relation) -> Relation {
        Relation {
            tuples: self.tuples.difference(&other.tuples).cloned().collect(),
        }
    }

    pub fn to_vec(&self) -> Vec<Tuple> {
        self.tuples.iter().cloned().collect()
    }
}

impl FromIterator<Tuple> for Relation {
    fn from_iter<I: IntoIterator<Item = Tuple>>(iter: I) -> Self {
        Relation {
            tuples: iter.into_iter().collect(),
        }
    }
}

impl Extend<Tuple> for Relation {
    fn extend<I: IntoIterator<Item = Tuple>>(&mut self, iter: I) {
        self.tuples.extend(iter);
    }
}

impl IntoIterator for Relation {
    type Item = Tuple;
    type IntoIter = btree_set::IntoIter<Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Relation {
    type Item = &'a Tuple;
    type IntoIter = btree_set::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_relation() {
        let seed = Relation::seed();
        assert_eq!(seed.len(), 1);
        assert_eq!(seed.iter().next().map(Tuple::arity), Some(0));
    }

    #[test]
    fn test_relation_set_semantics() {
        let mut rel = Relation::new();
        assert!(rel.insert(Tuple::ints(&[1, 2])));
        assert!(!rel.insert(Tuple::ints(&[1, 2])));
        assert_eq!(rel.len(), 1);
    }

    #[test]
    fn test_relation_difference() {
        let a: Relation = [Tuple::ints(&[1]), Tuple::ints(&[2])].into_iter().collect();
        let b: Relation = [Tuple::ints(&[2])].into_iter().collect();
        let d = a.difference(&b);
        assert_eq!(d.to_vec(), vec![Tuple::ints(&[1])]);
    }

    #[test]
    fn test_tuple_project_concat() {
        let t = Tuple::ints(&[1, 2, 3]);
        assert_eq!(t.project(&[2, 0]), Tuple::ints(&[3, 1]));
        assert_eq!(
            Tuple::ints(&[1]).concat(&Tuple::ints(&[2])),
            Tuple::ints(&[1, 2])
        );
    }

    #[test]
    fn test_tuple_display() {
        let t = Tuple::new(vec![Term::int(1), Term::string("a")]);
        assert_eq!(t.to_string(), "(1, \"a\")");
    }
}
