//! # ReasonFlow
//!
//! A Datalog rule-inference engine. Rules are stratified, their bodies
//! reordered for cheaper joins, compiled into relational operator chains and
//! evaluated to a fixpoint on timely/differential dataflow.
//!
//! ## Pipeline
//!
//! ```text
//! Rules (ast)
//!     ↓
//! [Safety]          → unbound head / negated / builtin variables rejected
//!     ↓
//! [Stratifier]      → ordered strata respecting negation
//!     ↓
//! [Join Planning]   → body literals reordered per rule
//!     ↓
//! [Rule Compiler]   → one PlanNode per literal + head substitution
//!     ↓
//! [Evaluation]      → naive or dependency-aware fixpoint per stratum
//!     ↓
//! [Dataflow]        → TimelyEngine jobs over the FactStore
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reasonflow::ast::builders::{fact, RuleBuilder};
//! use reasonflow::ast::{Atom, Term};
//! use reasonflow::{Config, Reasoner};
//!
//! # fn main() -> reasonflow::Result<()> {
//! let mut reasoner = Reasoner::new(Config::in_memory())?;
//! reasoner.import_facts(&[fact("edge", &[1, 2]), fact("edge", &[2, 3])])?;
//!
//! let program = vec![
//!     RuleBuilder::new("path")
//!         .head_vars(["X", "Y"])
//!         .body_atom("edge", ["X", "Y"])
//!         .build(),
//!     RuleBuilder::new("path")
//!         .head_vars(["X", "Z"])
//!         .body_atom("path", ["X", "Y"])
//!         .body_atom("edge", ["Y", "Z"])
//!         .build(),
//! ];
//! reasoner.evaluate(&program)?;
//!
//! let paths = reasoner.query(&Atom::new("path", vec![Term::int(1), Term::var("Y")]))?;
//! assert_eq!(paths.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! With `backend = "directory"` facts live under `project_dir` as JSON
//! lines, partitioned per predicate by volume; see [`storage`].

#![allow(clippy::doc_markdown)]

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod dataflow;
pub mod error;
pub mod evaluation;
pub mod ir;
pub mod join_planning;
pub mod logging;
pub mod reasoner;
pub mod rule_compiler;
pub mod safety;
pub mod storage;
pub mod stratifier;
pub mod value;

pub use ast::{Atom, Literal, Predicate, Rule, Term, Value};
pub use config::{Config, EvaluationConfig, LoggingConfig, StorageBackend, StorageConfig};
pub use context::{EvaluationContext, ProgramContext};
pub use dataflow::{DataflowEngine, DataflowError, DataflowJob, SinkBinding, TimelyEngine};
pub use error::{EngineError, Result};
pub use evaluation::{EvaluationLimits, Evaluator, StratumReport};
pub use join_planning::{JoinPlanner, JoinPlanningStats};
pub use reasoner::{EvaluationReport, Reasoner};
pub use rule_compiler::{compile_rule, CompiledRule, EvaluableRule, RuleInput};
pub use storage::{FactSink, FactSource, FactStore, PartitionManager, PredicateData};
pub use stratifier::{stratify, Stratification};
pub use value::{Relation, Tuple};
