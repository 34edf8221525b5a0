//! Directory-backed fact store
//!
//! Keeps every relation in memory and mirrors it to
//! `<project>/facts/<location>/<symbol>_<arity>.jsonl`, the location coming
//! from the project's [`PartitionManager`]. Every file write is staged under
//! `<project>/_tmp/` and renamed into place.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ast::Predicate;
use crate::value::Relation;

use super::error::{StorageError, StorageResult};
use super::layout::{fact_file_name, parse_fact_file_name, StorageLayout};
use super::partition::{commit_staged, create_staging, PartitionManager, Relocation};
use super::records::{JsonRecordFactory, RecordFactory};
use super::{FactSink, FactSource};

/// Fact store persisted under a project directory
pub struct DirectoryStore {
    layout: StorageLayout,
    partitions: PartitionManager,
    records: Box<dyn RecordFactory>,
    relations: HashMap<Predicate, Relation>,
}

impl DirectoryStore {
    /// Open a project with JSON-lines records
    pub fn open(project: impl Into<PathBuf>, block_size: i64) -> StorageResult<Self> {
        DirectoryStore::open_with(project, block_size, Box::new(JsonRecordFactory))
    }

    /// Open a project with a specific record factory
    pub fn open_with(
        project: impl Into<PathBuf>,
        block_size: i64,
        records: Box<dyn RecordFactory>,
    ) -> StorageResult<Self> {
        let layout = StorageLayout::new(project);
        fs::create_dir_all(layout.facts_root())?;
        let partitions = PartitionManager::open(&layout, block_size)?;
        let mut store = DirectoryStore {
            layout,
            partitions,
            records,
            relations: HashMap::new(),
        };
        store.load_all()?;
        Ok(store)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn partitions(&self) -> &PartitionManager {
        &self.partitions
    }

    /// File currently holding a predicate's facts
    pub fn fact_file(&self, predicate: &Predicate) -> PathBuf {
        let location = self.partitions.location_of(&predicate.symbol);
        self.layout.fact_file(location, predicate)
    }

    fn load_all(&mut self) -> StorageResult<()> {
        for location_dir in fs::read_dir(self.layout.facts_root())? {
            let location_dir = location_dir?;
            let is_location = location_dir
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<i32>().is_ok());
            if !is_location || !location_dir.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(location_dir.path())? {
                let file = file?;
                let Some(predicate) = file.file_name().to_str().and_then(parse_fact_file_name)
                else {
                    continue;
                };
                let relation = self.read_relation(&predicate, &file.path())?;
                self.relations
                    .entry(predicate)
                    .or_default()
                    .union_with(relation);
            }
        }
        debug!(
            project = %self.layout.project().display(),
            predicates = self.relations.len(),
            "directory_store_loaded"
        );
        Ok(())
    }

    fn read_relation(&self, predicate: &Predicate, path: &Path) -> StorageResult<Relation> {
        let reader = BufReader::new(File::open(path)?);
        let mut relation = Relation::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            relation.insert(self.records.decode(predicate, &line)?);
        }
        Ok(relation)
    }

    /// Write a relation to `target` through a staging file
    fn write_staged(
        &self,
        staging_name: &str,
        target: &Path,
        relation: &Relation,
    ) -> StorageResult<()> {
        let staging = self.layout.staging_file(staging_name);
        fs::create_dir_all(self.layout.staging_dir())?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = create_staging(&staging)?;
        commit_staged(file, &staging, target, |writer| {
            for tuple in relation {
                writeln!(writer, "{}", self.records.encode(tuple)?)?;
            }
            Ok(())
        })
    }

    fn persist(&self, predicate: &Predicate) -> StorageResult<()> {
        let relation = self.relations.get(predicate).cloned().unwrap_or_default();
        let name = fact_file_name(predicate);
        self.write_staged(&name, &self.fact_file(predicate), &relation)
    }

    fn relocate(&self, relocation: &Relocation) -> StorageResult<()> {
        for predicate in self.relations.keys().filter(|p| p.symbol == relocation.value) {
            let from = self.layout.fact_file(relocation.from, predicate);
            let to = self.layout.fact_file(relocation.to, predicate);
            if !from.exists() {
                continue;
            }
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&from, &to)?;
            debug!(
                predicate = %predicate,
                from = %from.display(),
                to = %to.display(),
                "fact_file_moved"
            );
        }
        Ok(())
    }

    /// Load one batch of base facts.
    ///
    /// Partition counts are updated with the number of new facts per symbol
    /// and the mapping is saved once for the whole batch.
    pub fn import_batch(&mut self, batch: BTreeMap<Predicate, Relation>) -> StorageResult<usize> {
        let mut per_symbol: BTreeMap<String, i64> = BTreeMap::new();
        let mut total = 0;

        for (predicate, tuples) in batch {
            let added = self.insert(&predicate, tuples)?;
            total += added.len();
            *per_symbol.entry(predicate.symbol.clone()).or_insert(0) += added.len() as i64;
        }

        let counts: Vec<(String, i64)> = per_symbol.into_iter().collect();
        for relocation in self.partitions.add_predicates(&counts) {
            self.relocate(&relocation)?;
        }
        self.partitions.save()?;

        info!(facts = total, predicates = counts.len(), "import_batch_done");
        Ok(total)
    }

    /// Persist one step's derived tuples under `inferences/`
    pub fn write_inference(
        &self,
        result_name: &str,
        flow_id: &str,
        relation: &Relation,
    ) -> StorageResult<PathBuf> {
        let dir = self.layout.inference_dir(result_name, flow_id);
        let target = dir.join(format!("part-00000.{}", self.records.format()));
        self.write_staged(&format!("{result_name}{flow_id}.part"), &target, relation)?;
        Ok(dir)
    }
}

impl FactSource for DirectoryStore {
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

impl FactSink for DirectoryStore {
    fn insert(&mut self, predicate: &Predicate, tuples: Relation) -> StorageResult<Relation> {
        let existing = self.relations.entry(predicate.clone()).or_default();
        let added: Relation = tuples.into_iter().filter(|t| existing.insert(t.clone())).collect();
        if !added.is_empty() {
            self.persist(predicate)?;
        }
        Ok(added)
    }
}
