//! A running Log Service instance.
//!
//! ## Key Responsibilities
//! - Serves LogService requests through the shared [`LogRepository`]
//! - Competes for leadership and runs maintenance while leader
//! - Tracks readiness so requests are refused until the node runs
//!
//! ## Example Usage
//! ```rust,ignore
//! let node = NodeBuilder::from_config(config, shutdown_rx)
//!     .build()?
//!     .start_rpc_server()
//!     .await?
//!     .ready()?;
//! node.run().await?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::ElectionState;
use crate::LeaderElector;
use crate::LogRepository;
use crate::LogServiceConfig;
use crate::LogStore;
use crate::Result;

pub struct Node {
    pub(crate) instance_id: String,
    pub(crate) repository: Arc<LogRepository>,
    pub(crate) store: Arc<dyn LogStore>,
    pub(crate) elector: LeaderElector,
    pub(crate) ready: AtomicBool,
    pub(crate) shutdown_signal: watch::Receiver<()>,

    pub config: Arc<LogServiceConfig>,
}

impl Node {
    /// Marks the node ready and runs the leader elector until shutdown.
    /// Durable state is flushed before returning.
    pub async fn run(&self) -> Result<()> {
        info!("[{}] node is running", self.instance_id);
        self.set_ready(true);

        let result = self.elector.run(self.shutdown_signal.clone()).await;

        self.set_ready(false);
        if let Err(e) = self.store.flush() {
            warn!("[{}] final flush failed: {:?}", self.instance_id, e);
        }
        info!("[{}] node stopped", self.instance_id);
        result
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn server_is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn repository(&self) -> &Arc<LogRepository> {
        &self.repository
    }

    pub fn election_state(&self) -> ElectionState {
        self.elector.state()
    }

    pub fn subscribe_election(&self) -> watch::Receiver<ElectionState> {
        self.elector.subscribe()
    }
}
