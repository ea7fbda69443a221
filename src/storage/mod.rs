//! Durable store layer.
//!
//! [`LogStore`] is the seam between the repository and the transactional
//! store. Every mutating operation is a single serializable store
//! transaction; offset sequencing lives here, never in process memory.
mod sled_adapter;

use std::path::Path;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
pub use sled_adapter::*;
use tracing::debug;
use tracing::warn;

use crate::constants::LEASE_DB_DIR;
use crate::constants::LOG_DB_DIR;
use crate::Result;
use crate::StorageError;

/// One retained record of a collection log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub offset: i64,
    pub payload: Vec<u8>,
    /// Unix epoch milliseconds at which the record was accepted
    pub enqueued_at_ms: i64,
}

/// Point-in-time view of one collection log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStats {
    /// Most recently appended offset, 0 when nothing was ever appended
    pub head_offset: i64,
    /// Oldest retained offset, `head_offset + 1` when the log is empty
    pub tail_offset: i64,
    pub record_count: u64,
    /// `None` for an empty log
    pub oldest_retained_age: Option<Duration>,
}

impl LogStats {
    pub fn empty() -> Self {
        Self {
            head_offset: 0,
            tail_offset: crate::FIRST_OFFSET,
            record_count: 0,
            oldest_retained_age: None,
        }
    }

    /// Offset the next append will receive
    pub fn next_offset(&self) -> i64 {
        self.head_offset + 1
    }
}

#[cfg_attr(test, automock)]
pub trait LogStore: Send + Sync + 'static {
    /// Appends `payloads` as one contiguous offset run, in order, and returns
    /// the assigned offsets. The head bump and the inserts commit together.
    fn append(
        &self,
        collection_id: &str,
        payloads: &[Vec<u8>],
        enqueued_at_ms: i64,
    ) -> Result<Vec<i64>>;

    /// Returns at most `limit` retained records with `offset >= start_offset`,
    /// ascending.
    fn read(
        &self,
        collection_id: &str,
        start_offset: i64,
        limit: usize,
    ) -> Result<Vec<LogRecord>>;

    /// Deletes every retained record with `offset < boundary` and advances the
    /// tail to `min(boundary, head + 1)`. Returns the number of deleted records.
    fn purge(
        &self,
        collection_id: &str,
        boundary: i64,
    ) -> Result<u64>;

    fn stats(
        &self,
        collection_id: &str,
    ) -> Result<LogStats>;

    /// Collection ids that have a persisted sequencing row
    fn list_collections(&self) -> Result<Vec<String>>;

    /// Removes every record and the sequencing row of a collection.
    fn drop_collection(
        &self,
        collection_id: &str,
    ) -> Result<u64>;

    fn flush(&self) -> Result<()>;
}

/// Opens the record database under `<db_root_dir>/log`
pub fn init_sled_log_db(sled_db_root_path: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    debug!("init_sled_log_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref().join(LOG_DB_DIR);
    sled::Config::default()
        .path(&path)
        .cache_capacity(512 * 1024 * 1024) //512MB
        .use_compression(true)
        .compression_factor(1)
        .mode(sled::Mode::HighThroughput)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            StorageError::DbError(format!("open {}: {}", path.display(), e)).into()
        })
}

/// Opens the lease database under `<db_root_dir>/lease`
pub fn init_sled_lease_db(sled_db_root_path: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    debug!("init_sled_lease_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref().join(LEASE_DB_DIR);
    sled::Config::default()
        .path(&path)
        .cache_capacity(4 * 1024 * 1024) //4MB
        .flush_every_ms(Some(3))
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            StorageError::DbError(format!("open {}: {}", path.display(), e)).into()
        })
}
