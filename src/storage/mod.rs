//! Storage utilities and the on-disk layout.
//!
//! ## Modules
//!
//! - `rocksdb`: Generic RocksDB utilities (configuration, handle, batches)
//!
//! ## Column Families
//!
//! - `actors`: `{actor_id}` -> actor record
//! - `content`: `{kind}:{content_id}` -> content reference
//! - `edges`: `{kind}{target_id}:{source_id}` -> edge record
//! - `counters`: `{kind}{target_id}` -> active edge count
//! - `reports`: `{report_id}` -> report
//! - `bans`: `{actor_id}` -> active ban record
//! - `notifications`: `{notification_id}` -> notification
//! - `meta`: id high-water marks

pub mod rocksdb;

pub use rocksdb::{id_key, prefixed_key, BatchOp, RocksDbConfig, RocksDbHandle};

use crate::error::Result;
use std::path::Path;
use tracing::info;

/// Database subdirectory.
const DB_DIR: &str = "murmur_db";

pub const CF_ACTORS: &str = "actors";
pub const CF_CONTENT: &str = "content";
pub const CF_EDGES: &str = "edges";
pub const CF_COUNTERS: &str = "counters";
pub const CF_REPORTS: &str = "reports";
pub const CF_BANS: &str = "bans";
pub const CF_NOTIFICATIONS: &str = "notifications";
pub const CF_META: &str = "meta";

/// Every column family the service uses.
pub const COLUMN_FAMILIES: &[&str] = &[
    CF_ACTORS,
    CF_CONTENT,
    CF_EDGES,
    CF_COUNTERS,
    CF_REPORTS,
    CF_BANS,
    CF_NOTIFICATIONS,
    CF_META,
];

/// Key in `meta` holding the next report id.
pub const META_NEXT_REPORT_ID: &[u8] = b"next_report_id";

/// Key in `meta` holding the next notification id.
pub const META_NEXT_NOTIFICATION_ID: &[u8] = b"next_notification_id";

/// Opens the service database under `data_dir`.
pub fn open_service_db(data_dir: impl AsRef<Path>) -> Result<RocksDbHandle> {
    let db_path = data_dir.as_ref().join(DB_DIR);
    let handle = RocksDbHandle::open(&db_path, &RocksDbConfig::for_server(), COLUMN_FAMILIES)?;
    info!("Opened murmur RocksDB at {:?}", db_path);
    Ok(handle)
}

/// Applies a batch when persistence is enabled; a no-op for in-memory stores.
pub(crate) fn commit(db: Option<&RocksDbHandle>, ops: &[BatchOp]) -> Result<()> {
    match db {
        Some(db) => db.write_batch(ops),
        None => Ok(()),
    }
}
