//! Predicate Partition Manager
//!
//! Assigns each predicate to a storage location by volume. A predicate
//! starts in the shared partition (location 0) and is moved to a dedicated
//! location once its cumulative imported count reaches the block size.
//!
//! The mapping is persisted as `bincode` records written back to back:
//!
//! ```text
//! { value: string, id: i32, location: i32, count: i64 }  repeated until EOF
//! ```
//!
//! Saving goes through a staging file that must not already exist. That
//! check is the only guard against a second writer; it is not a lock.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::{StorageError, StorageResult};
use super::layout::StorageLayout;

/// Count at which a predicate gets its own location
pub const DEFAULT_BLOCK_SIZE: i64 = 1024;

/// The shared partition
pub const DEFAULT_LOCATION: i32 = 0;

/// One persisted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateData {
    /// Predicate symbol
    pub value: String,
    pub id: i32,
    pub location: i32,
    /// Known fact cardinality
    pub count: i64,
}

/// A predicate that changed location during `add_predicates`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub value: String,
    pub from: i32,
    pub to: i32,
}

/// Per-project predicate partition mapping
#[derive(Debug, Clone)]
pub struct PartitionManager {
    config_path: PathBuf,
    staging_path: PathBuf,
    block_size: i64,
    entries: Vec<PredicateData>,
}

impl PartitionManager {
    /// Empty manager writing to `config_path` through `staging_path`
    pub fn new(config_path: PathBuf, staging_path: PathBuf, block_size: i64) -> Self {
        PartitionManager {
            config_path,
            staging_path,
            block_size,
            entries: Vec::new(),
        }
    }

    /// Manager for a project layout, loading any saved mapping
    pub fn open(layout: &StorageLayout, block_size: i64) -> StorageResult<Self> {
        let mut manager = PartitionManager::new(
            layout.partition_config(),
            layout.staging_file("_predicates.tmp"),
            block_size,
        );
        manager.load()?;
        Ok(manager)
    }

    pub fn with_entries(mut self, entries: Vec<PredicateData>) -> Self {
        self.entries = entries;
        self
    }

    pub fn entries(&self) -> &[PredicateData] {
        &self.entries
    }

    pub fn block_size(&self) -> i64 {
        self.block_size
    }

    /// Linear lookup by predicate symbol
    pub fn get(&self, value: &str) -> Option<&PredicateData> {
        self.entries.iter().find(|e| e.value == value)
    }

    /// Location of a predicate; unknown predicates live in the shared partition
    pub fn location_of(&self, value: &str) -> i32 {
        self.get(value).map_or(DEFAULT_LOCATION, |e| e.location)
    }

    fn next_location(&self) -> i32 {
        self.entries
            .iter()
            .map(|e| e.location)
            .max()
            .unwrap_or(DEFAULT_LOCATION)
            + 1
    }

    fn next_id(&self) -> i32 {
        self.entries.iter().map(|e| e.id).max().map_or(0, |id| id + 1)
    }

    /// Account for one import batch of `(symbol, count)` pairs.
    ///
    /// Returns the predicates whose location changed.
    pub fn add_predicates(&mut self, counts: &[(String, i64)]) -> Vec<Relocation> {
        let mut relocations = Vec::new();

        for (value, count) in counts {
            let next_location = self.next_location();
            let block_size = self.block_size;

            if let Some(entry) = self.entries.iter_mut().find(|e| &e.value == value) {
                entry.count += count;
                if entry.location == DEFAULT_LOCATION && entry.count >= block_size {
                    relocations.push(Relocation {
                        value: value.clone(),
                        from: entry.location,
                        to: next_location,
                    });
                    entry.location = next_location;
                }
                continue;
            }

            let location = if *count >= block_size {
                relocations.push(Relocation {
                    value: value.clone(),
                    from: DEFAULT_LOCATION,
                    to: next_location,
                });
                next_location
            } else {
                DEFAULT_LOCATION
            };
            let id = self.next_id();
            self.entries.push(PredicateData {
                value: value.clone(),
                id,
                location,
                count: *count,
            });
        }

        for r in &relocations {
            info!(predicate = %r.value, from = r.from, to = r.to, "partition_promoted");
        }
        relocations
    }

    /// Read the saved mapping; a missing file means no partitions yet
    pub fn load(&mut self) -> StorageResult<()> {
        self.entries = match File::open(&self.config_path) {
            Ok(file) => read_records(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %self.config_path.display(),
            entries = self.entries.len(),
            "partitions_loaded"
        );
        Ok(())
    }

    /// Write all entries to the staging file, then replace the saved mapping
    pub fn save(&self) -> StorageResult<()> {
        if let Some(parent) = self.staging_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = create_staging(&self.staging_path)?;
        commit_staged(file, &self.staging_path, &self.config_path, |writer| {
            write_records(writer, &self.entries)
        })?;
        debug!(
            path = %self.config_path.display(),
            entries = self.entries.len(),
            "partitions_saved"
        );
        Ok(())
    }
}

/// Create a staging file; an existing one belongs to another writer
pub(crate) fn create_staging(path: &Path) -> StorageResult<File> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(StorageError::ConcurrentWrite(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Fill a staging file and move it over `target`.
///
/// The staging file is removed if any step fails, so the next writer does
/// not mistake it for a concurrent one.
pub(crate) fn commit_staged<F>(
    file: File,
    staging: &Path,
    target: &Path,
    write: F,
) -> StorageResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> StorageResult<()>,
{
    let outcome = (|| -> StorageResult<()> {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        drop(file);
        replace_file(staging, target)
    })();

    if outcome.is_err() {
        if let Err(e) = fs::remove_file(staging) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %staging.display(), error = %e, "staging_cleanup_failed");
            }
        }
    }
    outcome
}

/// Delete-then-rename
pub(crate) fn replace_file(from: &Path, to: &Path) -> StorageResult<()> {
    match fs::remove_file(to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::rename(from, to)?;
    Ok(())
}

/// Serialize records back to back
pub fn write_records<W: Write>(writer: &mut W, entries: &[PredicateData]) -> StorageResult<()> {
    for entry in entries {
        bincode::serialize_into(&mut *writer, entry)?;
    }
    writer.flush()?;
    Ok(())
}

/// Deserialize records until a clean end of input
pub fn read_records<R: BufRead>(mut reader: R) -> StorageResult<Vec<PredicateData>> {
    let mut entries = Vec::new();
    while !reader.fill_buf()?.is_empty() {
        entries.push(bincode::deserialize_from(&mut reader)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> PartitionManager {
        PartitionManager::open(&StorageLayout::new(dir.path()), DEFAULT_BLOCK_SIZE).unwrap()
    }

    #[test]
    fn test_missing_config_is_empty() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        assert!(m.entries().is_empty());
        assert_eq!(m.location_of("edge"), DEFAULT_LOCATION);
    }

    #[test]
    fn test_small_batches_stay_in_shared_partition() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir);
        for _ in 0..10 {
            assert!(m.add_predicates(&[("edge".to_string(), 100)]).is_empty());
        }
        assert_eq!(m.get("edge").unwrap().count, 1000);
        assert_eq!(m.location_of("edge"), 0);
    }

    #[test]
    fn test_cumulative_promotion() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir);
        m.add_predicates(&[("edge".to_string(), 1000)]);
        let moved = m.add_predicates(&[("edge".to_string(), 24)]);
        assert_eq!(
            moved,
            vec![Relocation {
                value: "edge".to_string(),
                from: 0,
                to: 1
            }]
        );
        assert_eq!(m.location_of("edge"), 1);
        // Already dedicated: further imports do not move it again
        assert!(m.add_predicates(&[("edge".to_string(), 5000)]).is_empty());
    }

    #[test]
    fn test_large_first_batch_gets_fresh_location() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir);
        m.add_predicates(&[("a".to_string(), 2000), ("b".to_string(), 1), ("c".to_string(), 1024)]);
        assert_eq!(m.location_of("a"), 1);
        assert_eq!(m.location_of("b"), 0);
        assert_eq!(m.location_of("c"), 2);
        let ids: Vec<i32> = m.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir);
        m.add_predicates(&[("edge".to_string(), 3), ("big".to_string(), 4096)]);
        m.save().unwrap();
        // Saving twice replaces the file
        m.save().unwrap();

        let reloaded = manager(&dir);
        assert_eq!(reloaded.entries(), m.entries());
        assert!(!dir.path().join("_tmp/_predicates.tmp").exists());
    }

    #[test]
    fn test_existing_staging_file_is_concurrent_write() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        fs::create_dir_all(dir.path().join("_tmp")).unwrap();
        fs::write(dir.path().join("_tmp/_predicates.tmp"), b"other writer").unwrap();
        assert!(matches!(m.save(), Err(StorageError::ConcurrentWrite(_))));
    }

    #[test]
    fn test_failed_save_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir);
        m.add_predicates(&[("edge".to_string(), 3)]);
        // A directory where the config file belongs makes the final replace fail
        let config = dir.path().join("facts/_predicates");
        fs::create_dir_all(&config).unwrap();

        assert!(m.save().is_err());
        assert!(!dir.path().join("_tmp/_predicates.tmp").exists());

        fs::remove_dir(&config).unwrap();
        m.save().unwrap();
        assert_eq!(manager(&dir).entries(), m.entries());
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut bytes = Vec::new();
        write_records(
            &mut bytes,
            &[PredicateData {
                value: "edge".to_string(),
                id: 0,
                location: 0,
                count: 1,
            }],
        )
        .unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(read_records(bytes.as_slice()).is_err());
    }
}
