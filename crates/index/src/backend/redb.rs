//! Redb (Rust embedded database) backend for block index storage.
//!
//! Redb is a pure Rust embedded key-value store with ACID transactions. Keys
//! are kept in one table and sorted, so prefix scans are range reads.
//!
//! # Configuration Example
//! ```yaml
//! index:
//!   backend: "redb"
//!   path: "/data/blocks.redb"
//! ```

use crate::{IndexBackend, IndexError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table definition for all block index data
const BLOCKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("clone_blocks");

/// Redb backend implementation for persistent key-value storage.
///
/// # Thread Safety
/// The `Arc<Database>` wrapper allows safe sharing across threads.
/// Redb handles its own internal locking and MVCC.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    ///
    /// # Example
    /// ```no_run
    /// use index::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/blocks.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let db = Database::create(path).map_err(|e| IndexError::backend(e.to_string()))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| IndexError::backend(e.to_string()))?;
        {
            // Accessing the table creates it if it doesn't exist
            let _table = write_txn
                .open_table(BLOCKS_TABLE)
                .map_err(|e| IndexError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| IndexError::backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Open a database that must already exist and hold the blocks table.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IndexError::NotFound(format!(
                "index database {} does not exist",
                path.display()
            )));
        }
        let db = Database::open(path).map_err(|e| IndexError::backend(e.to_string()))?;
        {
            let read_txn = db
                .begin_read()
                .map_err(|e| IndexError::backend(e.to_string()))?;
            read_txn.open_table(BLOCKS_TABLE).map_err(|e| {
                IndexError::NotFound(format!("{}: {e}", path.display()))
            })?;
        }
        Ok(Self { db: Arc::new(db) })
    }
}

impl IndexBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| IndexError::backend(e.to_string()))?;

        {
            let mut table = write_txn
                .open_table(BLOCKS_TABLE)
                .map_err(|e| IndexError::backend(e.to_string()))?;
            table
                .insert(key, value)
                .map_err(|e| IndexError::backend(e.to_string()))?;
        }

        write_txn
            .commit()
            .map_err(|e| IndexError::backend(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| IndexError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(BLOCKS_TABLE)
            .map_err(|e| IndexError::backend(e.to_string()))?;

        match table
            .get(key)
            .map_err(|e| IndexError::backend(e.to_string()))?
        {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), IndexError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| IndexError::backend(e.to_string()))?;

        {
            let mut table = write_txn
                .open_table(BLOCKS_TABLE)
                .map_err(|e| IndexError::backend(e.to_string()))?;
            table
                .remove(key)
                .map_err(|e| IndexError::backend(e.to_string()))?;
        }

        write_txn
            .commit()
            .map_err(|e| IndexError::backend(e.to_string()))?;
        Ok(())
    }

    fn batch_put(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), IndexError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| IndexError::backend(e.to_string()))?;

        {
            let mut table = write_txn
                .open_table(BLOCKS_TABLE)
                .map_err(|e| IndexError::backend(e.to_string()))?;

            for (key, value) in entries {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| IndexError::backend(e.to_string()))?;
            }
        }

        write_txn
            .commit()
            .map_err(|e| IndexError::backend(e.to_string()))?;
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| IndexError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(BLOCKS_TABLE)
            .map_err(|e| IndexError::backend(e.to_string()))?;

        for item in table
            .range(prefix..)
            .map_err(|e| IndexError::backend(e.to_string()))?
        {
            let (key, value) = item.map_err(|e| IndexError::backend(e.to_string()))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value.value())?;
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), IndexError> {
        // Redb commits are synchronous, every write is durable once it returns.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_redb_backend_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("key1", b"value1").unwrap();
        let result = backend.get("key1").unwrap();
        assert_eq!(result, Some(b"value1".to_vec()));

        let result = backend.get("nonexistent").unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_redb_backend_batch_and_delete() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend
            .batch_put(vec![
                ("doc/1".to_string(), b"one".to_vec()),
                ("doc/2".to_string(), b"two".to_vec()),
            ])
            .unwrap();
        assert_eq!(backend.get("doc/2").unwrap(), Some(b"two".to_vec()));

        backend.delete("doc/1").unwrap();
        assert_eq!(backend.get("doc/1").unwrap(), None);
    }

    #[test]
    fn test_redb_prefix_scan() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();
        backend
            .batch_put(vec![
                ("df/a".to_string(), b"1".to_vec()),
                ("df/b".to_string(), b"2".to_vec()),
                ("doc/a".to_string(), b"3".to_vec()),
            ])
            .unwrap();

        let mut keys = Vec::new();
        backend
            .scan_prefix("df/", &mut |key, _| {
                keys.push(key.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(keys, vec!["df/a", "df/b"]);
    }

    #[test]
    fn test_redb_reopen_keeps_data() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let backend = RedbBackend::open(temp_file.path()).unwrap();
            backend.put("meta/x", b"kept").unwrap();
        }
        let backend = RedbBackend::open_existing(temp_file.path()).unwrap();
        assert_eq!(backend.get("meta/x").unwrap(), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_redb_open_existing_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.redb");
        assert!(matches!(
            RedbBackend::open_existing(&missing),
            Err(IndexError::NotFound(_))
        ));
    }
}
