use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::MaintenanceTask;
use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::metrics::remove_collection_series;
use crate::metrics::DROPPED_RECORDS_METRIC;
use crate::metrics::MAINTENANCE_FAILURES_METRIC;
use crate::metrics::PURGED_RECORDS_METRIC;
use crate::BackoffPolicy;
use crate::LogRepository;
use crate::PurgeConfig;
use crate::Result;

pub(crate) const PURGE_TASK: &str = "purge";

/// Outcome of one purge cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// Active collections purged successfully (including no-op purges)
    pub purged: usize,
    pub records_deleted: u64,
    /// Orphaned logs removed
    pub dropped: usize,
    pub failed: usize,
}

/// Deletes records behind each collection's retention checkpoint
pub struct PurgeLoop {
    repository: Arc<LogRepository>,
    config: PurgeConfig,
    purge_policy: BackoffPolicy,
    sysdb_policy: BackoffPolicy,
}

impl PurgeLoop {
    pub fn new(
        repository: Arc<LogRepository>,
        config: PurgeConfig,
        purge_policy: BackoffPolicy,
        sysdb_policy: BackoffPolicy,
    ) -> Self {
        Self {
            repository,
            config,
            purge_policy,
            sysdb_policy,
        }
    }

    /// One pass over the active set, then over orphaned logs.
    ///
    /// # Errors
    /// Only when the active set cannot be listed; the cycle is skipped.
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PurgeReport> {
        let active = {
            let sysdb = self.repository.sysdb().clone();
            task_with_timeout_and_exponential_backoff(
                move || {
                    let sysdb = sysdb.clone();
                    async move { sysdb.list_active_collections().await }
                },
                self.sysdb_policy,
                Some(cancel),
            )
            .await?
        };

        let mut report = PurgeReport::default();
        for collection_id in &active {
            if cancel.is_cancelled() {
                debug!("purge cycle cancelled");
                return Ok(report);
            }

            match self.purge_collection(collection_id, cancel).await {
                Ok(deleted) => {
                    report.purged += 1;
                    report.records_deleted += deleted;
                    if deleted > 0 {
                        PURGED_RECORDS_METRIC
                            .with_label_values(&[collection_id])
                            .inc_by(deleted);
                    }
                }
                Err(e) if e.is_collection_not_found() => {
                    debug!("{} deleted while purging, skipped", collection_id);
                }
                Err(e) => {
                    error!("purge of {} failed: {:?}", collection_id, e);
                    report.failed += 1;
                    MAINTENANCE_FAILURES_METRIC
                        .with_label_values(&[PURGE_TASK, collection_id])
                        .inc();
                }
            }
        }

        if self.config.drop_orphaned_logs {
            self.drop_orphans(&active, cancel, &mut report).await;
        }

        Ok(report)
    }

    async fn purge_collection(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let repository = self.repository.clone();
        let collection_id = collection_id.to_string();
        task_with_timeout_and_exponential_backoff(
            move || purge_to_checkpoint(repository.clone(), collection_id.clone()),
            self.purge_policy,
            Some(cancel),
        )
        .await
    }

    /// Drops logs the registry no longer reports. Existence is re-checked
    /// per collection so a listing race cannot drop a live log.
    async fn drop_orphans(
        &self,
        active: &[String],
        cancel: &CancellationToken,
        report: &mut PurgeReport,
    ) {
        let persisted = match self.repository.list_collections() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("listing persisted logs failed, orphan cleanup skipped: {:?}", e);
                return;
            }
        };

        let active: HashSet<&str> = active.iter().map(String::as_str).collect();
        for collection_id in persisted.iter().filter(|id| !active.contains(id.as_str())) {
            if cancel.is_cancelled() {
                return;
            }

            let sysdb = self.repository.sysdb().clone();
            let id = collection_id.clone();
            let exists = task_with_timeout_and_exponential_backoff(
                move || {
                    let sysdb = sysdb.clone();
                    let id = id.clone();
                    async move { sysdb.collection_exists(&id).await }
                },
                self.sysdb_policy,
                Some(cancel),
            )
            .await;

            let outcome = match exists {
                Ok(true) => continue,
                Ok(false) => self.repository.drop_collection(collection_id),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(deleted) => {
                    info!("dropped orphaned log {} ({} records)", collection_id, deleted);
                    report.dropped += 1;
                    report.records_deleted += deleted;
                    DROPPED_RECORDS_METRIC.inc_by(deleted);
                    remove_collection_series(collection_id);
                }
                Err(e) => {
                    error!("orphan cleanup of {} failed: {:?}", collection_id, e);
                    report.failed += 1;
                    MAINTENANCE_FAILURES_METRIC
                        .with_label_values(&[PURGE_TASK, collection_id])
                        .inc();
                }
            }
        }
    }
}

/// Fetches the current checkpoint and purges below it. The checkpoint is
/// read on every attempt, never reused.
async fn purge_to_checkpoint(
    repository: Arc<LogRepository>,
    collection_id: String,
) -> Result<u64> {
    let checkpoint = repository.sysdb().retention_checkpoint(&collection_id).await?;
    repository.purge(&collection_id, checkpoint).await
}

#[async_trait]
impl MaintenanceTask for PurgeLoop {
    fn name(&self) -> &'static str {
        PURGE_TASK
    }

    async fn run(
        &self,
        cancel: CancellationToken,
    ) {
        info!("purge loop started, interval {:?}", self.config.interval());
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle(&cancel).await {
                Ok(report) if report.failed > 0 => warn!("purge cycle finished with failures: {:?}", report),
                Ok(report) => info!("purge cycle finished: {:?}", report),
                Err(e) => warn!("purge cycle skipped, active collections unavailable: {:?}", e),
            }
        }
        info!("purge loop stopped");
    }
}
