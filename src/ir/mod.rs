//! # Operator Graph
//!
//! The relational operator tree a compiled rule submits to the dataflow
//! engine. Every node works on positional tuples; variable names are resolved
//! to column indices by the rule compiler, which keeps the schema of each
//! intermediate result alongside the node it builds.
//!
//! ```text
//! Rule -> [Rule Compiler] -> PlanNode -> [Dataflow Engine] -> Tuples
//! ```

use std::fmt;

use crate::ast::Term;
use crate::builtins::Builtin;
use crate::error::{EngineError, Result};
use crate::value::Tuple;

/// Keep tuples that hold specific constants at specific positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantFilter {
    arity: usize,
    constants: Vec<(usize, Term)>,
}

impl ConstantFilter {
    /// Build a filter for tuples of `arity` columns.
    ///
    /// Fails with `BuiltinArity` if more constants are given than the tuple
    /// has positions, or a position lies outside the tuple.
    pub fn new(arity: usize, constants: Vec<(usize, Term)>) -> Result<Self> {
        if constants.len() > arity {
            return Err(EngineError::BuiltinArity(format!(
                "filter binds {} constants on a tuple of arity {arity}",
                constants.len()
            )));
        }
        if let Some((position, _)) = constants.iter().find(|(p, _)| *p >= arity) {
            return Err(EngineError::BuiltinArity(format!(
                "filter position {position} is outside a tuple of arity {arity}"
            )));
        }
        Ok(ConstantFilter { arity, constants })
    }

    /// Filter on every ground position of a literal pattern
    pub fn for_pattern(terms: &[Term]) -> Result<Self> {
        let constants = terms
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_ground())
            .map(|(i, t)| (i, t.clone()))
            .collect();
        ConstantFilter::new(terms.len(), constants)
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn constants(&self) -> &[(usize, Term)] {
        &self.constants
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        tuple.arity() == self.arity
            && self
                .constants
                .iter()
                .all(|(i, c)| tuple.get(*i) == Some(c))
    }
}

/// Match tuples against a literal pattern and emit its variable bindings
///
/// Handles repeated variables (`p(X, X)`) and constructed terms with
/// variables inside (`p(f(X), Y)`). The output tuple holds one column per
/// entry of `schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    terms: Vec<Term>,
    schema: Vec<String>,
}

impl Pattern {
    pub fn new(terms: Vec<Term>) -> Self {
        let mut schema: Vec<String> = Vec::new();
        for term in &terms {
            for v in term.variables() {
                if !schema.iter().any(|s| s == v) {
                    schema.push(v.to_string());
                }
            }
        }
        Pattern { terms, schema }
    }

    /// Variables bound by this pattern, in column order
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn apply(&self, tuple: &Tuple) -> Option<Tuple> {
        if tuple.arity() != self.terms.len() {
            return None;
        }
        let mut bindings: Vec<Option<Term>> = vec![None; self.schema.len()];
        for (pattern, value) in self.terms.iter().zip(tuple.terms()) {
            if !self.unify(pattern, value, &mut bindings) {
                return None;
            }
        }
        bindings.into_iter().collect::<Option<Vec<_>>>().map(Tuple::new)
    }

    fn unify(&self, pattern: &Term, value: &Term, bindings: &mut [Option<Term>]) -> bool {
        match pattern {
            Term::Variable(name) => {
                let Some(slot) = self.schema.iter().position(|s| s == name) else {
                    return false;
                };
                match &bindings[slot] {
                    Some(existing) => existing == value,
                    None => {
                        bindings[slot] = Some(value.clone());
                        true
                    }
                }
            }
            Term::Constant(_) => pattern == value,
            Term::Constructed { functor, args } => match value {
                Term::Constructed {
                    functor: other,
                    args: values,
                } if functor == other && args.len() == values.len() => args
                    .iter()
                    .zip(values)
                    .all(|(p, v)| self.unify(p, v, bindings)),
                _ => false,
            },
        }
    }
}

/// Rewrite a tuple over `schema` into the shape of `terms`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    terms: Vec<Term>,
    schema: Vec<String>,
}

impl Template {
    pub fn new(terms: Vec<Term>, schema: Vec<String>) -> Self {
        Template { terms, schema }
    }

    /// Variables of the template not covered by the input schema
    pub fn unbound_variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for term in &self.terms {
            for v in term.variables() {
                if !self.schema.iter().any(|s| s == v) && !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    pub fn instantiate(&self, tuple: &Tuple) -> Option<Tuple> {
        self.terms
            .iter()
            .map(|t| substitute(t, &self.schema, tuple))
            .collect::<Option<Vec<_>>>()
            .map(Tuple::new)
    }
}

/// Replace variables in `term` by their column value, `None` if any is missing
pub(crate) fn substitute(term: &Term, schema: &[String], tuple: &Tuple) -> Option<Term> {
    match term {
        Term::Variable(name) => {
            let index = schema.iter().position(|s| s == name)?;
            tuple.get(index).cloned()
        }
        Term::Constant(_) => Some(term.clone()),
        Term::Constructed { functor, args } => args
            .iter()
            .map(|a| substitute(a, schema, tuple))
            .collect::<Option<Vec<_>>>()
            .map(|args| Term::Constructed {
                functor: functor.clone(),
                args,
            }),
    }
}

/// A builtin applied to every input tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinCall {
    pub builtin: Builtin,
    pub args: Vec<Term>,
    /// Schema of the input tuples
    pub schema: Vec<String>,
    /// Variable the call binds, appended as a new column
    pub output: Option<String>,
    /// Negated calls keep tuples for which the builtin does not hold
    pub negated: bool,
}

impl BuiltinCall {
    pub fn apply(&self, tuple: &Tuple) -> Option<Tuple> {
        let args: Vec<Option<Term>> = self
            .args
            .iter()
            .map(|a| substitute(a, &self.schema, tuple))
            .collect();
        let unbound = args.iter().position(Option::is_none);

        // Arity was checked at compile time; a failure here fails the tuple
        let holds = self.builtin.apply(&args).ok().flatten();
        if self.negated {
            return holds.is_none().then(|| tuple.clone());
        }
        let values = holds?;
        match (&self.output, unbound) {
            (Some(_), Some(position)) => Some(tuple.clone().with(values[position].clone())),
            _ => Some(tuple.clone()),
        }
    }
}

/// IR Node - one relational operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    /// Named relation bound when the job is submitted
    Input { binding: String, arity: usize },

    /// Keep tuples with the given constants
    Filter {
        input: Box<PlanNode>,
        filter: ConstantFilter,
    },

    /// Unify with a literal pattern, projecting onto its variables
    Match {
        input: Box<PlanNode>,
        pattern: Pattern,
    },

    /// Equi-join; output is `left ++ right[right_keep]`
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
        right_keep: Vec<usize>,
    },

    /// Left tuples with no right tuple agreeing on the keys
    Antijoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    },

    /// Builtin evaluation per tuple
    Builtin {
        input: Box<PlanNode>,
        call: BuiltinCall,
    },

    /// Rewrite into the head tuple shape
    Substitute {
        input: Box<PlanNode>,
        template: Template,
    },
}

impl PlanNode {
    pub fn input(binding: &str, arity: usize) -> Self {
        PlanNode::Input {
            binding: binding.to_string(),
            arity,
        }
    }

    /// Input bindings referenced by this tree, with their expected arity
    pub fn inputs(&self) -> Vec<(&str, usize)> {
        let mut out = Vec::new();
        self.collect_inputs(&mut out);
        out
    }

    fn collect_inputs<'a>(&'a self, out: &mut Vec<(&'a str, usize)>) {
        match self {
            PlanNode::Input { binding, arity } => {
                if !out.iter().any(|(b, _)| b == binding) {
                    out.push((binding, *arity));
                }
            }
            PlanNode::Filter { input, .. }
            | PlanNode::Match { input, .. }
            | PlanNode::Builtin { input, .. }
            | PlanNode::Substitute { input, .. } => input.collect_inputs(out),
            PlanNode::Join { left, right, .. } | PlanNode::Antijoin { left, right, .. } => {
                left.collect_inputs(out);
                right.collect_inputs(out);
            }
        }
    }

    /// Count operators in the tree
    pub fn node_count(&self) -> usize {
        1 + match self {
            PlanNode::Input { .. } => 0,
            PlanNode::Filter { input, .. }
            | PlanNode::Match { input, .. }
            | PlanNode::Builtin { input, .. }
            | PlanNode::Substitute { input, .. } => input.node_count(),
            PlanNode::Join { left, right, .. } | PlanNode::Antijoin { left, right, .. } => {
                left.node_count() + right.node_count()
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            PlanNode::Input { binding, arity } => writeln!(f, "{pad}Input {binding}/{arity}"),
            PlanNode::Filter { input, filter } => {
                let constants: Vec<String> = filter
                    .constants()
                    .iter()
                    .map(|(i, c)| format!("${i}={c}"))
                    .collect();
                writeln!(f, "{pad}Filter [{}]", constants.join(", "))?;
                input.fmt_indented(f, depth + 1)
            }
            PlanNode::Match { input, pattern } => {
                writeln!(f, "{pad}Match -> ({})", pattern.schema().join(", "))?;
                input.fmt_indented(f, depth + 1)
            }
            PlanNode::Join {
                left,
                right,
                left_keys,
                right_keys,
                ..
            } => {
                writeln!(f, "{pad}Join {left_keys:?} = {right_keys:?}")?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            PlanNode::Antijoin {
                left,
                right,
                left_keys,
                right_keys,
            } => {
                writeln!(f, "{pad}Antijoin {left_keys:?} = {right_keys:?}")?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            PlanNode::Builtin { input, call } => {
                let prefix = if call.negated { "NOT " } else { "" };
                writeln!(f, "{pad}Builtin {prefix}{}", call.builtin.as_str())?;
                input.fmt_indented(f, depth + 1)
            }
            PlanNode::Substitute { input, template } => {
                let terms: Vec<String> = template.terms.iter().map(ToString::to_string).collect();
                writeln!(f, "{pad}Substitute ({})", terms.join(", "))?;
                input.fmt_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
