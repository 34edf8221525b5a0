//! Project directory layout
//!
//! ```text
//! <project>/
//!   facts/
//!     _predicates                        partition metadata records
//!     <location>/<symbol>_<arity>.jsonl  facts of one predicate
//!   inferences/<name>/<name><flow-id>/   derived results of one step
//!   _tmp/                                staging area
//! ```

use std::path::{Path, PathBuf};

use crate::ast::Predicate;

/// Resolves logical storage locations to paths under a project directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    project: PathBuf,
}

impl StorageLayout {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        StorageLayout {
            project: project.into(),
        }
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn facts_root(&self) -> PathBuf {
        self.project.join("facts")
    }

    pub fn facts_dir(&self, location: i32) -> PathBuf {
        self.facts_root().join(location.to_string())
    }

    pub fn fact_file(&self, location: i32, predicate: &Predicate) -> PathBuf {
        self.facts_dir(location).join(fact_file_name(predicate))
    }

    pub fn partition_config(&self) -> PathBuf {
        self.facts_root().join("_predicates")
    }

    pub fn inference_dir(&self, result_name: &str, flow_id: &str) -> PathBuf {
        self.project
            .join("inferences")
            .join(result_name)
            .join(format!("{result_name}{flow_id}"))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.project.join("_tmp")
    }

    pub fn staging_file(&self, name: &str) -> PathBuf {
        self.staging_dir().join(name)
    }
}

/// `<symbol>_<arity>.jsonl`
pub fn fact_file_name(predicate: &Predicate) -> String {
    format!("{}_{}.jsonl", predicate.symbol, predicate.arity)
}

/// Inverse of [`fact_file_name`]
pub fn parse_fact_file_name(name: &str) -> Option<Predicate> {
    let stem = name.strip_suffix(".jsonl")?;
    let (symbol, arity) = stem.rsplit_once('_')?;
    if symbol.is_empty() {
        return None;
    }
    Some(Predicate::new(symbol, arity.parse().ok()?))
}
