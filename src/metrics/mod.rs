//! Process-wide prometheus collectors and the `/metrics` endpoint.
//!
//! Collectors live in [`REGISTRY`]; the scrape response also carries the
//! autometrics function-level series.

use std::sync::Once;

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::GaugeVec;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::maintenance::METRICS_TASK;
use crate::maintenance::PURGE_TASK;

pub(crate) const COLLECTION_LABEL: &str = "collection_id";
pub(crate) const TASK_LABEL: &str = "task";

lazy_static! {
    pub static ref PUSHED_RECORDS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("log_pushed_records_total", "Records appended per collection"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref PULLED_RECORDS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("log_pulled_records_total", "Records returned by pulls per collection"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref PURGED_RECORDS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("log_purged_records_total", "Records deleted by retention purge per collection"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref DROPPED_RECORDS_METRIC: IntCounter = IntCounter::new(
        "log_dropped_records_total",
        "Records deleted together with the log of a removed collection"
    )
    .expect("metric can not be created");

    pub static ref PUSH_BATCH_SIZE_METRIC: Histogram = Histogram::with_opts(
        HistogramOpts::new("log_push_batch_size", "Records per push batch")
            .buckets(exponential_buckets(1.0, 2.0, 12).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref BACKLOG_DEPTH_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("log_backlog_depth", "Retained records not yet purged (head - tail + 1)"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref OLDEST_RECORD_AGE_METRIC: GaugeVec = GaugeVec::new(
        Opts::new("log_oldest_record_age_seconds", "Age of the oldest retained record"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref HEAD_OFFSET_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("log_head_offset", "Most recently appended offset"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref TAIL_OFFSET_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("log_tail_offset", "Oldest retained offset"),
        &[COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref MAINTENANCE_FAILURES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("log_maintenance_failures_total", "Per-collection maintenance failures"),
        &[TASK_LABEL, COLLECTION_LABEL]
    )
    .expect("metric can not be created");

    pub static ref IS_LEADER_METRIC: IntGauge =
        IntGauge::new("log_is_leader", "1 while this instance holds the maintenance lease")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PUSHED_RECORDS_METRIC.clone()),
            Box::new(PULLED_RECORDS_METRIC.clone()),
            Box::new(PURGED_RECORDS_METRIC.clone()),
            Box::new(DROPPED_RECORDS_METRIC.clone()),
            Box::new(PUSH_BATCH_SIZE_METRIC.clone()),
            Box::new(BACKLOG_DEPTH_METRIC.clone()),
            Box::new(OLDEST_RECORD_AGE_METRIC.clone()),
            Box::new(HEAD_OFFSET_METRIC.clone()),
            Box::new(TAIL_OFFSET_METRIC.clone()),
            Box::new(MAINTENANCE_FAILURES_METRIC.clone()),
            Box::new(IS_LEADER_METRIC.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("collector can not be registered: {}", e);
            }
        }
        if let Err(e) = prometheus_exporter::try_init() {
            error!("autometrics exporter init failed: {:?}", e);
        }
    });
}

/// Serves `GET /metrics` until `shutdown_signal` changes
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("metrics endpoint listening on 0.0.0.0:{}", port);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_metrics_text())
}

/// Text exposition of every custom collector followed by the autometrics
/// series
pub fn gather_metrics_text() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    res.push_str(&get_metrics_body());
    res
}

/// Export autometrics series for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}

/// Removes every per-collection gauge series of `collection_id`
pub(crate) fn remove_collection_gauges(collection_id: &str) {
    let _ = BACKLOG_DEPTH_METRIC.remove_label_values(&[collection_id]);
    let _ = OLDEST_RECORD_AGE_METRIC.remove_label_values(&[collection_id]);
    let _ = HEAD_OFFSET_METRIC.remove_label_values(&[collection_id]);
    let _ = TAIL_OFFSET_METRIC.remove_label_values(&[collection_id]);
}

/// Removes every series labeled with `collection_id`, counters included.
/// Used once the collection is gone for good.
pub(crate) fn remove_collection_series(collection_id: &str) {
    remove_collection_gauges(collection_id);
    let _ = PUSHED_RECORDS_METRIC.remove_label_values(&[collection_id]);
    let _ = PULLED_RECORDS_METRIC.remove_label_values(&[collection_id]);
    let _ = PURGED_RECORDS_METRIC.remove_label_values(&[collection_id]);
    for task in [PURGE_TASK, METRICS_TASK] {
        let _ = MAINTENANCE_FAILURES_METRIC.remove_label_values(&[task, collection_id]);
    }
}
