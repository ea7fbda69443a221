//! Leader-only background work.
//!
//! Each loop walks the active collection set once per interval. A failure on
//! one collection is logged, counted and skipped; it never stops the cycle
//! or the loop.
mod metrics_loop;
mod purge_loop;


pub use metrics_loop::*;
pub use purge_loop::*;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;

/// A cancellable background task started by the elector on acquiring
/// leadership.
#[async_trait]
pub trait MaintenanceTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Runs until `cancel` fires. Must check the token between collection
    /// iterations and return promptly once it is cancelled.
    async fn run(
        &self,
        cancel: CancellationToken,
    );
}
