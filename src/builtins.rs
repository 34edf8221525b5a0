//! # Builtin Predicates
//!
//! Predicates with engine-provided semantics. A body literal is a builtin
//! when its symbol (case-insensitive) and arity name one of [`Builtin`];
//! otherwise it is an ordinary relation.
//!
//! A builtin is applied to one tuple of arguments at a time. With every
//! argument bound it is a check. With exactly one unbound argument it
//! computes that argument, provided the position is bindable for that
//! builtin (see [`Builtin::can_bind`]). Type mismatches, overflow and
//! division by zero make the tuple fail; they are never errors.

use std::cmp::Ordering;

use crate::ast::{Atom, Literal, Term, Value, LIST_FUNCTOR};
use crate::error::{EngineError, Result};

/// Built-in predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Comparisons: op(a, b)
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Arithmetic: op(a, b, c) holds iff a op b = c
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,

    /// concat(a, b, c): c is a followed by b
    Concat,
    /// string_length(s, n)
    StringLength,
    /// list_length(l, n)
    ListLength,
}

impl Builtin {
    /// Parse a builtin name; arity must match as well
    pub fn parse(name: &str, arity: usize) -> Option<Self> {
        let builtin = match name.to_uppercase().as_str() {
            "EQUAL" => Builtin::Equal,
            "NOT_EQUAL" => Builtin::NotEqual,
            "LESS" => Builtin::Less,
            "LESS_EQUAL" => Builtin::LessEqual,
            "GREATER" => Builtin::Greater,
            "GREATER_EQUAL" => Builtin::GreaterEqual,
            "ADD" => Builtin::Add,
            "SUBTRACT" => Builtin::Subtract,
            "MULTIPLY" => Builtin::Multiply,
            "DIVIDE" => Builtin::Divide,
            "MODULUS" => Builtin::Modulus,
            "CONCAT" => Builtin::Concat,
            "STRING_LENGTH" => Builtin::StringLength,
            "LIST_LENGTH" => Builtin::ListLength,
            _ => return None,
        };
        (builtin.arity() == arity).then_some(builtin)
    }

    /// The builtin named by an atom, if any
    pub fn of_atom(atom: &Atom) -> Option<Self> {
        Builtin::parse(&atom.predicate.symbol, atom.arity())
    }

    pub fn of_literal(literal: &Literal) -> Option<Self> {
        Builtin::of_atom(&literal.atom)
    }

    pub fn is_builtin(literal: &Literal) -> bool {
        Builtin::of_literal(literal).is_some()
    }

    pub fn arity(&self) -> usize {
        match self {
            Builtin::Equal
            | Builtin::NotEqual
            | Builtin::Less
            | Builtin::LessEqual
            | Builtin::Greater
            | Builtin::GreaterEqual
            | Builtin::StringLength
            | Builtin::ListLength => 2,
            Builtin::Add
            | Builtin::Subtract
            | Builtin::Multiply
            | Builtin::Divide
            | Builtin::Modulus
            | Builtin::Concat => 3,
        }
    }

    /// Get the canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Builtin::Equal => "EQUAL",
            Builtin::NotEqual => "NOT_EQUAL",
            Builtin::Less => "LESS",
            Builtin::LessEqual => "LESS_EQUAL",
            Builtin::Greater => "GREATER",
            Builtin::GreaterEqual => "GREATER_EQUAL",
            Builtin::Add => "ADD",
            Builtin::Subtract => "SUBTRACT",
            Builtin::Multiply => "MULTIPLY",
            Builtin::Divide => "DIVIDE",
            Builtin::Modulus => "MODULUS",
            Builtin::Concat => "CONCAT",
            Builtin::StringLength => "STRING_LENGTH",
            Builtin::ListLength => "LIST_LENGTH",
        }
    }

    /// Whether the argument at `position` can be computed from the others
    pub fn can_bind(&self, position: usize) -> bool {
        match self {
            Builtin::Equal => position < 2,
            Builtin::NotEqual
            | Builtin::Less
            | Builtin::LessEqual
            | Builtin::Greater
            | Builtin::GreaterEqual => false,
            Builtin::Add | Builtin::Subtract | Builtin::Multiply | Builtin::Concat => position < 3,
            Builtin::Divide | Builtin::Modulus => position == 2,
            Builtin::StringLength | Builtin::ListLength => position == 1,
        }
    }

    /// Apply to one argument vector, `None` marking the unbound position.
    ///
    /// Returns the completed arguments when the builtin holds, `Ok(None)` when
    /// the tuple fails, and `BuiltinArity` when more than one argument is
    /// unbound or the argument count is wrong.
    pub fn apply(&self, args: &[Option<Term>]) -> Result<Option<Vec<Term>>> {
        if args.len() != self.arity() {
            return Err(EngineError::BuiltinArity(format!(
                "{} expects {} arguments, got {}",
                self.as_str(),
                self.arity(),
                args.len()
            )));
        }

        let unbound: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_none())
            .map(|(i, _)| i)
            .collect();

        match unbound.as_slice() {
            [] => {
                let bound: Vec<Term> = args.iter().flatten().cloned().collect();
                Ok(self.check(&bound).then_some(bound))
            }
            [position] => {
                let Some(value) = self.solve(*position, args) else {
                    return Ok(None);
                };
                let mut bound: Vec<Term> = Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    match arg {
                        Some(t) => bound.push(t.clone()),
                        None if i == *position => bound.push(value.clone()),
                        None => return Ok(None),
                    }
                }
                Ok(self.check(&bound).then_some(bound))
            }
            _ => Err(EngineError::BuiltinArity(format!(
                "{} called with {} unbound arguments",
                self.as_str(),
                unbound.len()
            ))),
        }
    }

    fn check(&self, args: &[Term]) -> bool {
        match self {
            Builtin::Equal => args[0] == args[1],
            Builtin::NotEqual => args[0] != args[1],
            Builtin::Less => compare(&args[0], &args[1]) == Some(Ordering::Less),
            Builtin::LessEqual => matches!(
                compare(&args[0], &args[1]),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Builtin::Greater => compare(&args[0], &args[1]) == Some(Ordering::Greater),
            Builtin::GreaterEqual => matches!(
                compare(&args[0], &args[1]),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Builtin::Add
            | Builtin::Subtract
            | Builtin::Multiply
            | Builtin::Divide
            | Builtin::Modulus => match (int(&args[0]), int(&args[1]), int(&args[2])) {
                (Some(a), Some(b), Some(c)) => self.arith(a, b) == Some(c),
                _ => false,
            },
            Builtin::Concat => match (string(&args[0]), string(&args[1]), string(&args[2])) {
                (Some(a), Some(b), Some(c)) => {
                    c.len() == a.len() + b.len() && c.starts_with(a) && c.ends_with(b)
                }
                _ => false,
            },
            Builtin::StringLength => match (string(&args[0]), int(&args[1])) {
                (Some(s), Some(n)) => i64::try_from(s.chars().count()).ok() == Some(n),
                _ => false,
            },
            Builtin::ListLength => match (list_items(&args[0]), int(&args[1])) {
                (Some(items), Some(n)) => i64::try_from(items.len()).ok() == Some(n),
                _ => false,
            },
        }
    }

    fn arith(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            Builtin::Add => a.checked_add(b),
            Builtin::Subtract => a.checked_sub(b),
            Builtin::Multiply => a.checked_mul(b),
            Builtin::Divide => a.checked_div(b),
            Builtin::Modulus => a.checked_rem(b),
            _ => None,
        }
    }

    fn solve(&self, position: usize, args: &[Option<Term>]) -> Option<Term> {
        let arg = |i: usize| args.get(i).and_then(Option::as_ref);
        let int_arg = |i: usize| arg(i).and_then(int);
        let str_arg = |i: usize| arg(i).and_then(string);

        match (self, position) {
            (Builtin::Equal, 0) => arg(1).cloned(),
            (Builtin::Equal, 1) => arg(0).cloned(),

            (
                Builtin::Add
                | Builtin::Subtract
                | Builtin::Multiply
                | Builtin::Divide
                | Builtin::Modulus,
                2,
            ) => self.arith(int_arg(0)?, int_arg(1)?).map(Term::int),
            // a + b = c
            (Builtin::Add, 0) => int_arg(2)?.checked_sub(int_arg(1)?).map(Term::int),
            (Builtin::Add, 1) => int_arg(2)?.checked_sub(int_arg(0)?).map(Term::int),
            // a - b = c
            (Builtin::Subtract, 0) => int_arg(2)?.checked_add(int_arg(1)?).map(Term::int),
            (Builtin::Subtract, 1) => int_arg(0)?.checked_sub(int_arg(2)?).map(Term::int),
            // a * b = c, only when the quotient is exact
            (Builtin::Multiply, 0) => exact_div(int_arg(2)?, int_arg(1)?).map(Term::int),
            (Builtin::Multiply, 1) => exact_div(int_arg(2)?, int_arg(0)?).map(Term::int),

            (Builtin::Concat, 2) => Some(Term::string(&format!("{}{}", str_arg(0)?, str_arg(1)?))),
            (Builtin::Concat, 0) => str_arg(2)?.strip_suffix(str_arg(1)?).map(Term::string),
            (Builtin::Concat, 1) => str_arg(2)?.strip_prefix(str_arg(0)?).map(Term::string),

            (Builtin::StringLength, 1) => {
                i64::try_from(str_arg(0)?.chars().count()).ok().map(Term::int)
            }
            (Builtin::ListLength, 1) => {
                i64::try_from(list_items(arg(0)?)?.len()).ok().map(Term::int)
            }
            _ => None,
        }
    }
}

fn int(term: &Term) -> Option<i64> {
    term.as_value().and_then(Value::as_int)
}

fn string(term: &Term) -> Option<&str> {
    term.as_value().and_then(Value::as_str)
}

fn list_items(term: &Term) -> Option<&[Term]> {
    match term {
        Term::Constructed { functor, args } if functor == LIST_FUNCTOR => Some(args),
        _ => None,
    }
}

fn exact_div(c: i64, b: i64) -> Option<i64> {
    if b == 0 || c.checked_rem(b)? != 0 {
        return None;
    }
    c.checked_div(b)
}

/// Ordering between two constants of the same kind
fn compare(a: &Term, b: &Term) -> Option<Ordering> {
    match (a.as_value()?, b.as_value()?) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
