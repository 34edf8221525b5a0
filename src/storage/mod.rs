//! Storage Module
//!
//! Fact stores the evaluator reads base and derived facts from:
//! - [`MemoryStore`]: relations held for the lifetime of the reasoner
//! - [`DirectoryStore`]: relations mirrored to JSON-lines files under a
//!   project directory, partitioned per predicate by [`PartitionManager`]
//!
//! ## Layout
//!
//! ```text
//! <project>/facts/_predicates                 partition mapping (bincode)
//! <project>/facts/<location>/<sym>_<arity>.jsonl
//! <project>/inferences/<name>/<name><flow>/part-00000.jsonl
//! <project>/_tmp/                             staging files
//! ```

pub mod directory;
pub mod error;
pub mod layout;
pub mod memory;
pub mod partition;
pub mod records;

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::ast::Predicate;
use crate::config::{StorageBackend, StorageConfig};
use crate::context::EvaluationContext;
use crate::value::Relation;

pub use directory::DirectoryStore;
pub use error::{StorageError, StorageResult};
pub use layout::StorageLayout;
pub use memory::MemoryStore;
pub use partition::{PartitionManager, PredicateData, Relocation, DEFAULT_BLOCK_SIZE};
pub use records::{JsonRecordFactory, RecordFactory};

/// Read access to stored relations
pub trait FactSource {
    /// All tuples of a predicate; unknown predicates are empty
    fn scan(&self, predicate: &Predicate) -> StorageResult<Relation>;

    fn count(&self, predicate: &Predicate) -> StorageResult<usize>;

    /// Predicates with at least one stored tuple, sorted
    fn predicates(&self) -> Vec<Predicate>;
}

/// Write access to stored relations
pub trait FactSink {
    /// Add tuples to a predicate and return the ones that were not already there
    fn insert(&mut self, predicate: &Predicate, tuples: Relation) -> StorageResult<Relation>;
}

/// The configured fact store
pub enum FactStore {
    Memory(MemoryStore),
    Directory(DirectoryStore),
}

impl FactStore {
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(FactStore::Memory(MemoryStore::new())),
            StorageBackend::Directory => Ok(FactStore::Directory(DirectoryStore::open(
                config.project_dir.clone(),
                config.partition_block_size,
            )?)),
        }
    }

    /// Load one batch of base facts, returning how many were new
    pub fn import_batch(&mut self, batch: BTreeMap<Predicate, Relation>) -> StorageResult<usize> {
        match self {
            FactStore::Memory(store) => {
                let mut total = 0;
                for (predicate, tuples) in batch {
                    total += store.insert(&predicate, tuples)?.len();
                }
                Ok(total)
            }
            FactStore::Directory(store) => store.import_batch(batch),
        }
    }

    /// Record the tuples one rule evaluation produced.
    ///
    /// Only the directory backend keeps these; it returns the output directory.
    pub fn record_result(
        &self,
        result_name: &str,
        ctx: &EvaluationContext,
        relation: &Relation,
    ) -> StorageResult<Option<PathBuf>> {
        match self {
            FactStore::Memory(_) => Ok(None),
            FactStore::Directory(store) => {
                let dir = store.write_inference(result_name, &ctx.flow_id(), relation)?;
                debug!(
                    result = result_name,
                    flow = %ctx,
                    tuples = relation.len(),
                    "result_recorded"
                );
                Ok(Some(dir))
            }
        }
    }

    pub fn partitions(&self) -> Option<&PartitionManager> {
        match self {
            FactStore::Memory(_) => None,
            FactStore::Directory(store) => Some(store.partitions()),
        }
    }
}

impl FactSource for FactStore {
    fn scan(&self, predicate: &Predicate) -> StorageResult<Relation> {
        match self {
            FactStore::Memory(store) => store.scan(predicate),
            FactStore::Directory(store) => store.scan(predicate),
        }
    }

    fn count(&self, predicate: &Predicate) -> StorageResult<usize> {
        match self {
            FactStore::Memory(store) => store.count(predicate),
            FactStore::Directory(store) => store.count(predicate),
        }
    }

    fn predicates(&self) -> Vec<Predicate> {
        match self {
            FactStore::Memory(store) => store.predicates(),
            FactStore::Directory(store) => store.predicates(),
        }
    }
}

impl FactSink for FactStore {
    fn insert(&mut self, predicate: &Predicate, tuples: Relation) -> StorageResult<Relation> {
        match self {
            FactStore::Memory(store) => store.insert(predicate, tuples),
            FactStore::Directory(store) => store.insert(predicate, tuples),
        }
    }
}
