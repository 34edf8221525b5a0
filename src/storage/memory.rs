//! In-memory fact store

use std::collections::HashMap;

use crate::ast::Predicate;
use crate::value::Relation;

use super::error::StorageResult;
use super::{FactSink, FactSource};

/// Facts held in memory for the lifetime of the store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    relations: HashMap<Predicate, Relation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl FactSource for MemoryStore {
    fn scan(&self, predicate: &Predicate) -> StorageResult<Relation> {
        Ok(self.relations.get(predicate).cloned().unwrap_or_default())
    }

    fn count(&self, predicate: &Predicate) -> StorageResult<usize> {
        Ok(self.relations.get(predicate).map_or(0, Relation::len))
    }

    fn predicates(&self) -> Vec<Predicate> {
        let mut out: Vec<Predicate> = self.relations.keys().cloned().collect();
        out.sort();
        out
    }
}

impl FactSink for MemoryStore {
    fn insert(&mut self, predicate: &Predicate, tuples: Relation) -> StorageResult<Relation> {
        let existing = self.relations.entry(predicate.clone()).or_default();
        let added: Relation = tuples.into_iter().filter(|t| existing.insert(t.clone())).collect();
        Ok(added)
    }
}
