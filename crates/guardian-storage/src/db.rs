//! JSON file-backed column store.
//!
//! Every column is a map from string keys to serialized records. The whole
//! database is mirrored in memory and rewritten to `data.json` on each write,
//! so a write returns only after its effect is on disk. Files are replaced via
//! a temporary file and rename, so a crash mid-write leaves the previous
//! version intact.

use crate::error::StorageError;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const DATA_FILE: &str = "data.json";
const TMP_FILE: &str = "data.json.tmp";

type Tables = BTreeMap<String, BTreeMap<String, String>>;

/// Columns for organized data storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Proposals: proposal_id → Proposal
    Proposals,
    /// Votes: proposal_id/member_id → Vote
    Votes,
    /// Treasury executions: proposal_id → TreasuryExecutionRecord
    TreasuryExecutions,
    /// Metadata: key → value (schema version, id sequences)
    Metadata,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Proposals => "proposals",
            Column::Votes => "votes",
            Column::TreasuryExecutions => "treasury_executions",
            Column::Metadata => "metadata",
        }
    }

    pub fn all() -> [Column; 4] {
        [
            Column::Proposals,
            Column::Votes,
            Column::TreasuryExecutions,
            Column::Metadata,
        ]
    }
}

/// Group of writes applied and persisted together.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
    Put {
        column: Column,
        key: String,
        value: String,
    },
    Delete {
        column: Column,
        key: String,
    },
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a serialized put.
    pub fn put<T: Serialize>(
        &mut self,
        column: Column,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StorageError> {
        let value = serde_json::to_string(value)?;
        self.ops.push(BatchOp::Put {
            column,
            key: key.into(),
            value,
        });
        Ok(())
    }

    /// Queue a delete.
    pub fn delete(&mut self, column: Column, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete {
            column,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Database - JSON file storage, or purely in-memory when opened without a path.
pub struct Database {
    path: Option<PathBuf>,
    data: RwLock<Tables>,
    persist_lock: Mutex<()>,
}

impl Database {
    /// Open (or create) a database in `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            return Err(StorageError::InvalidPath(path_str.into_owned()));
        }
        fs::create_dir_all(path)?;

        let data_file = path.join(DATA_FILE);
        let data = if data_file.exists() {
            let content = fs::read_to_string(&data_file)?;
            serde_json::from_str::<Tables>(&content)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", data_file.display(), e)))?
        } else {
            Tables::new()
        };

        tracing::debug!(
            "Opened database at {} ({} columns)",
            path.display(),
            data.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            data: RwLock::new(data),
            persist_lock: Mutex::new(()),
        })
    }

    /// A database that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(Tables::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Whether writes reach disk.
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Read and deserialize a value.
    pub fn get<T: DeserializeOwned>(
        &self,
        column: Column,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let data = self.data.read();
        let Some(raw) = data.get(column.name()).and_then(|c| c.get(key)) else {
            return Ok(None);
        };
        decode(column, key, raw).map(Some)
    }

    /// Serialize and store a value.
    pub fn put<T: Serialize>(&self, column: Column, key: &str, value: &T) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.put(column, key, value)?;
        self.write(batch)
    }

    pub fn delete(&self, column: Column, key: &str) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.delete(column, key);
        self.write(batch)
    }

    /// Apply a batch and persist once.
    ///
    /// The batch is applied to a copy of the tables; memory is only updated
    /// after the copy is on disk, so a failed write leaves no trace.
    pub fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let _guard = self.persist_lock.lock();
        let mut next = self.data.read().clone();
        for op in batch.ops {
            match op {
                BatchOp::Put { column, key, value } => {
                    next.entry(column.name().to_string())
                        .or_default()
                        .insert(key, value);
                }
                BatchOp::Delete { column, key } => {
                    if let Some(entries) = next.get_mut(column.name()) {
                        entries.remove(&key);
                    }
                }
            }
        }
        self.persist(&next)?;
        *self.data.write() = next;
        Ok(())
    }

    /// All entries of a column, in key order.
    pub fn scan<T: DeserializeOwned>(&self, column: Column) -> Result<Vec<(String, T)>, StorageError> {
        let data = self.data.read();
        let Some(entries) = data.get(column.name()) else {
            return Ok(Vec::new());
        };
        entries
            .iter()
            .map(|(key, raw)| decode(column, key, raw).map(|v| (key.clone(), v)))
            .collect()
    }

    /// Number of entries in a column.
    pub fn len(&self, column: Column) -> usize {
        self.data
            .read()
            .get(column.name())
            .map(|c| c.len())
            .unwrap_or(0)
    }

    // Callers hold the persist lock, so files are written in commit order.
    fn persist(&self, tables: &Tables) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(tables)?;
        let tmp = path.join(TMP_FILE);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path.join(DATA_FILE))?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(column: Column, key: &str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Deserialization {
        column: column.name().to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        amount: u128,
    }

    fn record(name: &str, amount: u128) -> Record {
        Record {
            name: name.to_string(),
            amount,
        }
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).unwrap();

        assert!(db.is_persistent());
        // data.json is only created when data is written
        assert!(!temp_dir.path().join(DATA_FILE).exists());
    }

    #[test]
    fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).unwrap();

        db.put(Column::Proposals, "1", &record("a", 5)).unwrap();

        let got: Option<Record> = db.get(Column::Proposals, "1").unwrap();
        assert_eq!(got, Some(record("a", 5)));
        let missing: Option<Record> = db.get(Column::Proposals, "2").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_large_amounts_survive() {
        let db = Database::in_memory();
        db.put(Column::Votes, "k", &record("big", u128::MAX)).unwrap();

        let got: Record = db.get(Column::Votes, "k").unwrap().unwrap();
        assert_eq!(got.amount, u128::MAX);
    }

    #[test]
    fn test_delete() {
        let db = Database::in_memory();
        db.put(Column::Metadata, "k", &1u64).unwrap();
        db.delete(Column::Metadata, "k").unwrap();

        assert_eq!(db.get::<u64>(Column::Metadata, "k").unwrap(), None);
    }

    #[test]
    fn test_batch_write() {
        let db = Database::in_memory();

        let mut batch = WriteBatch::new();
        batch.put(Column::Votes, "1/alice", &record("alice", 1)).unwrap();
        batch.put(Column::Proposals, "1", &record("p", 2)).unwrap();
        batch.delete(Column::Votes, "1/alice");
        assert_eq!(batch.len(), 3);
        db.write(batch).unwrap();

        assert_eq!(db.get::<Record>(Column::Votes, "1/alice").unwrap(), None);
        assert_eq!(db.len(Column::Proposals), 1);
    }

    #[test]
    fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();

        {
            let db = Database::open(temp_dir.path()).unwrap();
            db.put(Column::Proposals, "1", &record("one", 1)).unwrap();
            db.put(Column::Proposals, "2", &record("two", 2)).unwrap();
        }

        // Reopen: should load from disk
        let db = Database::open(temp_dir.path()).unwrap();
        let all: Vec<(String, Record)> = db.scan(Column::Proposals).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], ("1".to_string(), record("one", 1)));
        assert!(!temp_dir.path().join(TMP_FILE).exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(DATA_FILE), "{not json").unwrap();

        let result = Database::open(temp_dir.path());
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_bad_record_is_reported() {
        let db = Database::in_memory();
        db.put(Column::Proposals, "1", &"just a string").unwrap();

        let result = db.get::<Record>(Column::Proposals, "1");
        assert!(matches!(result, Err(StorageError::Deserialization { .. })));
    }

    #[test]
    fn test_rejects_traversal() {
        let result = Database::open(Path::new("../outside"));
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    #[test]
    fn test_failed_write_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let db_dir = temp_dir.path().join("db");
        let db = Database::open(&db_dir).unwrap();
        db.put(Column::Proposals, "1", &record("one", 1)).unwrap();

        fs::remove_dir_all(&db_dir).unwrap();
        let result = db.put(Column::Votes, "1/bob", &record("bob", 700));
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(db.get::<Record>(Column::Votes, "1/bob").unwrap(), None);

        // A later successful write must not carry the failed row to disk.
        fs::create_dir_all(&db_dir).unwrap();
        db.put(Column::Proposals, "2", &record("two", 2)).unwrap();

        let reopened = Database::open(&db_dir).unwrap();
        assert_eq!(reopened.get::<Record>(Column::Votes, "1/bob").unwrap(), None);
        assert_eq!(reopened.len(Column::Proposals), 2);
    }

    #[test]
    fn test_columns_are_isolated() {
        let db = Database::in_memory();
        db.put(Column::Proposals, "k", &1u64).unwrap();
        db.put(Column::Votes, "k", &2u64).unwrap();

        assert_eq!(db.get::<u64>(Column::Proposals, "k").unwrap(), Some(1));
        assert_eq!(db.get::<u64>(Column::Votes, "k").unwrap(), Some(2));
        assert_eq!(Column::all().len(), 4);
    }
}
