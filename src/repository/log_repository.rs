//! Per-collection append, read, purge and stats.
//!
//! The repository is the single source of ordering and retention truth. It
//! gates every request-path operation on registry existence, then issues
//! exactly one store transaction. Sequencing races surface from the store as
//! `LogError::Conflict` and are retried here; nothing else is retried on the
//! request path.

use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use crate::metrics::remove_collection_series;
use crate::metrics::PUSHED_RECORDS_METRIC;
use crate::metrics::PUSH_BATCH_SIZE_METRIC;
use crate::convert::MAX_COLLECTION_ID_LEN;
use crate::time::now_ms;
use crate::BackoffPolicy;
use crate::Error;
use crate::LogError;
use crate::LogRecord;
use crate::LogStats;
use crate::LogStore;
use crate::Result;
use crate::SysDb;
use crate::API_SLO;

pub struct LogRepository {
    store: Arc<dyn LogStore>,
    sysdb: Arc<dyn SysDb>,
    append_conflict_policy: BackoffPolicy,
}

impl LogRepository {
    pub fn new(
        store: Arc<dyn LogStore>,
        sysdb: Arc<dyn SysDb>,
        append_conflict_policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            sysdb,
            append_conflict_policy,
        }
    }

    /// Appends one record and returns its offset.
    pub async fn append(
        &self,
        collection_id: &str,
        payload: Vec<u8>,
    ) -> Result<i64> {
        let offsets = self.append_batch(collection_id, vec![payload]).await?;
        offsets
            .first()
            .copied()
            .ok_or_else(|| Error::Fatal(format!("store returned no offset for {collection_id}")))
    }

    /// Appends `payloads` as one contiguous offset run in submission order.
    ///
    /// Either every record of the batch is durable or none is.
    #[autometrics(objective = API_SLO)]
    pub async fn append_batch(
        &self,
        collection_id: &str,
        payloads: Vec<Vec<u8>>,
    ) -> Result<Vec<i64>> {
        if payloads.is_empty() {
            return Err(LogError::InvalidArgument("batch must contain at least one record".into()).into());
        }
        self.ensure_exists(collection_id).await?;

        let enqueued_at_ms = now_ms();
        let max_attempts = self.append_conflict_policy.max_retries.max(1);
        let max_delay = Duration::from_millis(self.append_conflict_policy.max_delay_ms);
        let mut delay = Duration::from_millis(self.append_conflict_policy.base_delay_ms);
        let mut attempt = 0;

        let offsets = loop {
            attempt += 1;
            match self.store.append(collection_id, &payloads, enqueued_at_ms) {
                Err(Error::Log(LogError::Conflict(_))) if attempt < max_attempts => {
                    debug!("sequencing conflict on attempt {}, retrying in {:?}", attempt, delay);
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
                Err(e) => {
                    warn!("append to {} failed after {} attempts: {:?}", collection_id, attempt, e);
                    return Err(e);
                }
                Ok(offsets) => break offsets,
            }
        };

        PUSHED_RECORDS_METRIC
            .with_label_values(&[collection_id])
            .inc_by(offsets.len() as u64);
        PUSH_BATCH_SIZE_METRIC.observe(offsets.len() as f64);
        Ok(offsets)
    }

    /// Returns retained records starting at `max(start_offset, tail)`, at most
    /// `limit` of them. Purged offsets are simply absent.
    #[autometrics(objective = API_SLO)]
    pub async fn read(
        &self,
        collection_id: &str,
        start_offset: i64,
        limit: usize,
    ) -> Result<Vec<LogRecord>> {
        self.ensure_exists(collection_id).await?;
        self.store.read(collection_id, start_offset, limit)
    }

    /// Deletes every record below `boundary`. The caller owns the boundary;
    /// the store clamps it to `head + 1`.
    #[autometrics(objective = API_SLO)]
    pub async fn purge(
        &self,
        collection_id: &str,
        boundary: i64,
    ) -> Result<u64> {
        self.ensure_exists(collection_id).await?;
        self.store.purge(collection_id, boundary)
    }

    #[autometrics(objective = API_SLO)]
    pub async fn stats(
        &self,
        collection_id: &str,
    ) -> Result<LogStats> {
        self.ensure_exists(collection_id).await?;
        self.store.stats(collection_id)
    }

    /// Collections with a persisted log, known to the registry or not
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.store.list_collections()
    }

    /// Removes the whole log of a collection. Only meant for collections the
    /// registry has already forgotten, so existence is not checked.
    #[autometrics(objective = API_SLO)]
    pub fn drop_collection(
        &self,
        collection_id: &str,
    ) -> Result<u64> {
        self.store.drop_collection(collection_id)
    }

    pub fn sysdb(&self) -> &Arc<dyn SysDb> {
        &self.sysdb
    }

    async fn ensure_exists(
        &self,
        collection_id: &str,
    ) -> Result<()> {
        if collection_id.is_empty() {
            return Err(LogError::InvalidArgument("collection_id cannot be empty".into()).into());
        }
        if collection_id.len() > MAX_COLLECTION_ID_LEN {
            return Err(LogError::InvalidArgument(format!(
                "collection_id is {} bytes, at most {} allowed",
                collection_id.len(),
                MAX_COLLECTION_ID_LEN
            ))
            .into());
        }
        if !self.sysdb.collection_exists(collection_id).await? {
            debug!("collection {} unknown to the registry", collection_id);
            remove_collection_series(collection_id);
            return Err(LogError::CollectionNotFound(collection_id.to_string()).into());
        }
        Ok(())
    }
}
