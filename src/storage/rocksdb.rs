//! RocksDB storage utilities.
//!
//! Generic helpers used by every component that persists rows:
//!
//! - Configurable RocksDB setup with sensible defaults
//! - Typed key-value operations with bincode serialization
//! - Atomic multi-key write batches
//! - Full column family scans for startup loading

use crate::error::{MurmurError, Result};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

// =============================================================================
// RocksDB Configuration
// =============================================================================

/// Configuration for RocksDB storage.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of write buffers.
    pub max_write_buffer_number: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_open_files: 128,
            keep_log_file_num: 2,
            max_wal_size: 16 * 1024 * 1024,      // 16MB
            write_buffer_size: 16 * 1024 * 1024, // 16MB
            max_write_buffer_number: 2,
        }
    }
}

impl RocksDbConfig {
    /// Creates a configuration for the server process.
    ///
    /// Rows are small and write-heavy (edges, notifications), so buffers stay
    /// moderate while parallelism follows the core count.
    pub fn for_server() -> Self {
        Self {
            max_open_files: 256,
            keep_log_file_num: 3,
            max_wal_size: 64 * 1024 * 1024,      // 64MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
            max_write_buffer_number: 3,
        }
    }

    /// Builds RocksDB Options from this configuration.
    pub fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(self.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

// =============================================================================
// Key Generation Utilities
// =============================================================================

/// Big-endian key for a numeric id, so byte order matches numeric order.
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Creates a prefixed key with a separator.
///
/// Format: `{prefix}{separator}{suffix}`
pub fn prefixed_key(prefix: &[u8], separator: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix);
    key.push(separator);
    key.extend_from_slice(suffix);
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| MurmurError::serialization(format!("Failed to serialize: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| MurmurError::serialization(format!("Failed to deserialize: {}", e)))
}

// =============================================================================
// Write Batches
// =============================================================================

/// One operation of an atomic write batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put {
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: &'static str,
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Serializes `value` into a put operation.
    pub fn put<T: Serialize>(cf: &'static str, key: impl Into<Vec<u8>>, value: &T) -> Result<Self> {
        Ok(BatchOp::Put {
            cf,
            key: key.into(),
            value: encode(value)?,
        })
    }

    /// Creates a delete operation.
    pub fn delete(cf: &'static str, key: impl Into<Vec<u8>>) -> Self {
        BatchOp::Delete {
            cf,
            key: key.into(),
        }
    }
}

// =============================================================================
// Database Handle Wrapper
// =============================================================================

/// A wrapper around RocksDB that provides common operations.
///
/// Cloning is cheap; all clones share one database.
#[derive(Clone)]
pub struct RocksDbHandle {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksDbHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &RocksDbConfig,
        column_families: &[&str],
    ) -> Result<Self> {
        let opts = config.build_options();
        let cf_opts = Options::default();

        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &opts,
            db_path.as_ref(),
            cf_descriptors,
        )
        .map_err(|e| MurmurError::storage(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Gets a column family handle.
    pub fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MurmurError::storage(format!("Column family '{}' not found", name)))
    }

    /// Loads and deserializes a value from the given key.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;

        match self.db.get_cf(&cf, key) {
            Ok(Some(bytes)) => {
                trace!(
                    cf = cf_name,
                    key_len = key.len(),
                    value_bytes = bytes.len(),
                    "db_get: found record"
                );
                decode(&bytes).map(Some)
            }
            Ok(None) => {
                trace!(cf = cf_name, key_len = key.len(), "db_get: key not found");
                Ok(None)
            }
            Err(e) => Err(MurmurError::storage(format!("Failed to read: {}", e))),
        }
    }

    /// Applies all operations atomically: either every op is durable or none is.
    pub fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { cf, key, value } => {
                    let handle = self.cf(cf)?;
                    batch.put_cf(&handle, key, value);
                }
                BatchOp::Delete { cf, key } => {
                    let handle = self.cf(cf)?;
                    batch.delete_cf(&handle, key);
                }
            }
        }

        trace!(ops = ops.len(), "db_write_batch: committing batch");

        self.db
            .write(batch)
            .map_err(|e| MurmurError::storage(format!("Failed to write batch: {}", e)))
    }

    /// Iterates over all entries in a column family.
    ///
    /// An iterator error aborts the scan: callers rebuild state from the
    /// full column family and must not run on a partial read.
    pub fn iterate_all<F>(&self, cf_name: &str, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let iter = self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start);

        let mut count: usize = 0;
        for item in iter {
            let (key, value) = item.map_err(|e| {
                MurmurError::storage(format!("Failed to iterate {}: {}", cf_name, e))
            })?;
            count += 1;
            if !callback(&key, &value) {
                break;
            }
        }

        debug!(
            cf = cf_name,
            records_iterated = count,
            "db_iterate_all: completed full iteration"
        );

        Ok(())
    }

    /// Deserializes every value of a column family, skipping undecodable rows.
    pub fn collect_all<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut errors: usize = 0;

        self.iterate_all(cf_name, |_, value| {
            match decode(value) {
                Ok(item) => results.push(item),
                Err(e) => {
                    errors += 1;
                    warn!("Failed to deserialize row in {}: {}", cf_name, e);
                }
            }
            true
        })?;

        debug!(
            cf = cf_name,
            records_collected = results.len(),
            deserialization_errors = errors,
            "db_collect_all: collected records"
        );

        Ok(results)
    }
}

impl std::fmt::Debug for RocksDbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbHandle")
            .field("db", &"RocksDB")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestRow {
        name: String,
        value: u64,
    }

    fn create_test_db() -> (RocksDbHandle, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test_db");
        let config = RocksDbConfig::default();
        let db =
            RocksDbHandle::open(&db_path, &config, &["data", "meta"]).expect("Failed to open db");
        (db, temp_dir)
    }

    #[test]
    fn test_id_key_orders_numerically() {
        assert!(id_key(2) < id_key(10));
        assert!(id_key(255) < id_key(256));
    }

    #[test]
    fn test_prefixed_key() {
        let key = prefixed_key(b"P", b':', &id_key(1));
        assert_eq!(key, [b'P', b':', 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_batch_put_and_get() {
        let (db, _temp) = create_test_db();

        let row = TestRow {
            name: "Test".to_string(),
            value: 12345,
        };

        db.write_batch(&[BatchOp::put("data", b"key1".to_vec(), &row).unwrap()])
            .unwrap();

        let loaded: TestRow = db.get("data", b"key1").unwrap().unwrap();
        assert_eq!(loaded, row);
        assert!(db.get::<TestRow>("data", b"key2").unwrap().is_none());
    }

    #[test]
    fn test_write_batch_spans_column_families() {
        let (db, _temp) = create_test_db();
        db.write_batch(&[BatchOp::put("meta", b"stale".to_vec(), &1u64).unwrap()])
            .unwrap();

        let ops = vec![
            BatchOp::put("data", b"a".to_vec(), &7u64).unwrap(),
            BatchOp::put("meta", b"count".to_vec(), &1u64).unwrap(),
            BatchOp::delete("meta", b"stale".to_vec()),
        ];
        db.write_batch(&ops).unwrap();

        assert_eq!(db.get::<u64>("data", b"a").unwrap(), Some(7));
        assert_eq!(db.get::<u64>("meta", b"count").unwrap(), Some(1));
        assert_eq!(db.get::<u64>("meta", b"stale").unwrap(), None);
    }

    #[test]
    fn test_write_batch_unknown_cf_writes_nothing() {
        let (db, _temp) = create_test_db();

        let ops = vec![
            BatchOp::put("data", b"a".to_vec(), &7u64).unwrap(),
            BatchOp::put("missing", b"b".to_vec(), &8u64).unwrap(),
        ];
        assert!(db.write_batch(&ops).is_err());
        assert_eq!(db.get::<u64>("data", b"a").unwrap(), None);
    }

    #[test]
    fn test_collect_all() {
        let (db, _temp) = create_test_db();

        let ops: Vec<BatchOp> = (0..3u64)
            .map(|i| {
                let row = TestRow {
                    name: format!("row{}", i),
                    value: i,
                };
                BatchOp::put("data", id_key(i).to_vec(), &row).unwrap()
            })
            .collect();
        db.write_batch(&ops).unwrap();

        let rows: Vec<TestRow> = db.collect_all("data").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value, 0);
        assert_eq!(rows[2].value, 2);
    }

    #[test]
    fn test_collect_all_unknown_cf_fails() {
        let (db, _temp) = create_test_db();
        assert!(db.collect_all::<TestRow>("missing").is_err());
    }
}
