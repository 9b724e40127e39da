//! Storage layer: pluggable key-value backends with atomic batch commits
//!
//! Every multi-record change in the core is staged into a `StoreBatch` and
//! committed in one call, so either all of its puts/deletes land or none do.

use crate::config::{CompressionType, StorageBackend, StorageConfig};
use crate::errors::{StorageError, WagerError, WagerResult};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// A single staged mutation
#[derive(Clone, Debug)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered set of mutations committed atomically
#[derive(Clone, Debug, Default)]
pub struct StoreBatch {
    ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    pub fn put_json<T: Serialize>(&mut self, key: impl Into<Vec<u8>>, value: &T) -> WagerResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StorageError::WriteFailed(format!("encode failed: {}", e)))?;
        self.ops.push(BatchOp::Put(key.into(), bytes));
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Minimal contract any backing store must honor
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Entries whose key starts with `prefix`, in key order, at most `limit`
    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Apply every op in the batch or none of them
    fn commit(&self, batch: StoreBatch) -> Result<(), StorageError>;
}

/// RocksDB-backed store
pub struct RocksStorage {
    db: DB,
}

impl RocksStorage {
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number as i32);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, path).map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db })
    }
}

impl KvStore for RocksStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key).map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    fn commit(&self, batch: StoreBatch) -> Result<(), StorageError> {
        let mut write_batch = WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => write_batch.put(key, value),
                BatchOp::Delete(key) => write_batch.delete(key),
            }
        }
        self.db
            .write(write_batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }
}

/// Ordered in-memory store; a batch is applied under one write lock
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, batch: StoreBatch) -> Result<(), StorageError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Shared handle with typed JSON helpers over any `KvStore`
#[derive(Clone)]
pub struct Db {
    inner: Arc<dyn KvStore>,
}

impl Db {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { inner: store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Open the backend selected by the configuration
    pub fn open(config: &StorageConfig) -> WagerResult<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::RocksDb => {
                if config.clear_on_start {
                    warn!(path = %config.data_directory, "Testing mode: clearing database");
                    let _ = std::fs::remove_dir_all(&config.data_directory);
                }
                info!(path = %config.data_directory, "Opening RocksDB store");
                let storage = RocksStorage::open(&config.data_directory, config)?;
                Ok(Self::new(Arc::new(storage)))
            }
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> WagerResult<Option<T>> {
        let Some(bytes) = self.inner.get(key.as_bytes())? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::CorruptedData(format!("Failed to decode {}: {}", key, e))
        })?;
        Ok(Some(value))
    }

    pub fn get_string(&self, key: &str) -> WagerResult<Option<String>> {
        Ok(self
            .inner
            .get(key.as_bytes())?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn contains(&self, key: &str) -> WagerResult<bool> {
        Ok(self.inner.get(key.as_bytes())?.is_some())
    }

    /// Keys (as strings) under a prefix, in key order
    pub fn scan_keys(&self, prefix: &str, limit: usize) -> WagerResult<Vec<String>> {
        Ok(self
            .inner
            .scan_prefix(prefix.as_bytes(), limit)?
            .into_iter()
            .map(|(key, _)| String::from_utf8_lossy(&key).into_owned())
            .collect())
    }

    /// Values (as strings) under a prefix, in key order
    pub fn scan_values(&self, prefix: &str, limit: usize) -> WagerResult<Vec<String>> {
        Ok(self
            .inner
            .scan_prefix(prefix.as_bytes(), limit)?
            .into_iter()
            .map(|(_, value)| String::from_utf8_lossy(&value).into_owned())
            .collect())
    }

    pub fn scan_json<T: DeserializeOwned>(&self, prefix: &str, limit: usize) -> WagerResult<Vec<T>> {
        self.inner
            .scan_prefix(prefix.as_bytes(), limit)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_slice(&value).map_err(|e| {
                    WagerError::from(StorageError::CorruptedData(format!(
                        "Failed to decode {}: {}",
                        String::from_utf8_lossy(&key),
                        e
                    )))
                })
            })
            .collect()
    }

    pub fn commit(&self, batch: StoreBatch) -> WagerResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.inner.commit(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        n: u32,
    }

    fn exercise(db: &Db) {
        let mut batch = StoreBatch::new();
        batch.put_json("row:b", &Row { n: 2 }).unwrap();
        batch.put_json("row:a", &Row { n: 1 }).unwrap();
        batch.put_json("other:a", &Row { n: 9 }).unwrap();
        db.commit(batch).unwrap();

        let rows: Vec<Row> = db.scan_json("row:", 10).unwrap();
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
        assert_eq!(db.scan_keys("row:", 1).unwrap(), vec!["row:a".to_string()]);

        let mut batch = StoreBatch::new();
        batch.delete("row:a");
        batch.put_json("row:c", &Row { n: 3 }).unwrap();
        db.commit(batch).unwrap();

        assert_eq!(db.get_json::<Row>("row:a").unwrap(), None);
        assert_eq!(db.get_json::<Row>("row:c").unwrap(), Some(Row { n: 3 }));
    }

    #[test]
    fn test_memory_backend() {
        exercise(&Db::in_memory());
    }

    #[test]
    fn test_rocksdb_backend() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            data_directory: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let db = Db::open(&config).unwrap();
        exercise(&db);
    }

    #[test]
    fn test_corrupted_row_reported() {
        let db = Db::in_memory();
        let mut batch = StoreBatch::new();
        batch.put_raw("row:x", b"not json".to_vec());
        db.commit(batch).unwrap();

        let err = db.get_json::<Row>("row:x").unwrap_err();
        assert!(err.to_string().contains("Corrupted data"));
    }
}
