//! Durable, ordered, per-collection append log.
//!
//! Producers push operation records into a collection's log and receive
//! monotonically increasing offsets; compaction workers pull them back in
//! offset order. Exactly one instance of the fleet, elected through a lease,
//! purges records behind each collection's retention checkpoint and
//! publishes backlog metrics.
mod config;
mod constants;
mod election;
mod errors;
mod maintenance;
mod metrics;
mod network;
mod node;
mod repository;
mod storage;
mod sysdb;
pub mod proto;
pub mod utils;

pub use config::*;
pub use constants::FIRST_OFFSET;
pub use election::*;
pub use errors::*;
pub use maintenance::*;
pub use metrics::gather_metrics_text;
pub use node::*;
pub use repository::*;
pub use storage::*;
pub use sysdb::*;
pub use utils::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
