use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
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
use crate::metrics::remove_collection_gauges;
use crate::metrics::remove_collection_series;
use crate::metrics::BACKLOG_DEPTH_METRIC;
use crate::metrics::HEAD_OFFSET_METRIC;
use crate::metrics::MAINTENANCE_FAILURES_METRIC;
use crate::metrics::OLDEST_RECORD_AGE_METRIC;
use crate::metrics::TAIL_OFFSET_METRIC;
use crate::BackoffPolicy;
use crate::LogRepository;
use crate::LogStats;
use crate::MetricsLoopConfig;
use crate::Result;

pub(crate) const METRICS_TASK: &str = "metrics";

/// Outcome of one metrics cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetricsReport {
    pub published: usize,
    pub failed: usize,
}

/// Publishes per-collection backlog gauges
pub struct MetricsLoop {
    repository: Arc<LogRepository>,
    config: MetricsLoopConfig,
    stats_policy: BackoffPolicy,
    sysdb_policy: BackoffPolicy,
    /// Collections that currently have gauge series
    published: ArcSwap<HashSet<String>>,
}

impl MetricsLoop {
    pub fn new(
        repository: Arc<LogRepository>,
        config: MetricsLoopConfig,
        stats_policy: BackoffPolicy,
        sysdb_policy: BackoffPolicy,
    ) -> Self {
        Self {
            repository,
            config,
            stats_policy,
            sysdb_policy,
            published: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MetricsReport> {
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

        let mut report = MetricsReport::default();
        let mut published: HashSet<String> = HashSet::with_capacity(active.len());
        for collection_id in &active {
            if cancel.is_cancelled() {
                debug!("metrics cycle cancelled");
                break;
            }

            match self.collection_stats(collection_id, cancel).await {
                Ok(stats) => {
                    publish_gauges(collection_id, &stats);
                    published.insert(collection_id.clone());
                    report.published += 1;
                }
                Err(e) if e.is_collection_not_found() => {
                    debug!("{} deleted while collecting stats, skipped", collection_id);
                }
                Err(e) => {
                    error!("stats of {} failed: {:?}", collection_id, e);
                    report.failed += 1;
                    MAINTENANCE_FAILURES_METRIC
                        .with_label_values(&[METRICS_TASK, collection_id])
                        .inc();
                }
            }
        }

        // Series of collections still active but not refreshed this cycle
        // are kept; series of collections that left the active set go.
        let active: HashSet<&String> = active.iter().collect();
        let previous = self.published.load();
        for collection_id in previous.iter() {
            if active.contains(collection_id) {
                published.insert(collection_id.clone());
            } else {
                debug!("removing series of inactive collection {}", collection_id);
                remove_collection_series(collection_id);
            }
        }
        self.published.store(Arc::new(published));

        Ok(report)
    }

    /// Collections that currently have gauge series
    pub fn published_collections(&self) -> HashSet<String> {
        self.published.load().as_ref().clone()
    }

    async fn collection_stats(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<LogStats> {
        let repository = self.repository.clone();
        let collection_id = collection_id.to_string();
        task_with_timeout_and_exponential_backoff(
            move || {
                let repository = repository.clone();
                let collection_id = collection_id.clone();
                async move { repository.stats(&collection_id).await }
            },
            self.stats_policy,
            Some(cancel),
        )
        .await
    }

    fn clear(&self) {
        let previous = self.published.swap(Arc::new(HashSet::new()));
        for collection_id in previous.iter() {
            remove_collection_gauges(collection_id);
        }
    }
}

fn publish_gauges(
    collection_id: &str,
    stats: &LogStats,
) {
    BACKLOG_DEPTH_METRIC
        .with_label_values(&[collection_id])
        .set(stats.record_count as i64);
    HEAD_OFFSET_METRIC
        .with_label_values(&[collection_id])
        .set(stats.head_offset);
    TAIL_OFFSET_METRIC
        .with_label_values(&[collection_id])
        .set(stats.tail_offset);
    OLDEST_RECORD_AGE_METRIC
        .with_label_values(&[collection_id])
        .set(stats.oldest_retained_age.map(|age| age.as_secs_f64()).unwrap_or(0.0));
}

#[async_trait]
impl MaintenanceTask for MetricsLoop {
    fn name(&self) -> &'static str {
        METRICS_TASK
    }

    async fn run(
        &self,
        cancel: CancellationToken,
    ) {
        info!("metrics loop started, interval {:?}", self.config.interval());
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle(&cancel).await {
                Ok(report) if report.failed > 0 => warn!("metrics cycle finished with failures: {:?}", report),
                Ok(report) => debug!("metrics cycle finished: {:?}", report),
                Err(e) => warn!("metrics cycle skipped, active collections unavailable: {:?}", e),
            }
        }

        // Only the leader exports backlog gauges
        self.clear();
        info!("metrics loop stopped");
    }
}
