//! A builder for assembling a [`Node`] from configuration.
//!
//! [`NodeBuilder`] opens the sled databases, picks the registry client, and
//! wires the repository, the leader elector and the maintenance loops.
//! Any component can be overridden before `build()`, which is how tests run
//! against in-process registries and mock stores.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(None, shutdown_rx)?
//!     .build()?
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .start_rpc_server()
//!     .await?
//!     .ready()?;
//! ```

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::init_sled_lease_db;
use crate::init_sled_log_db;
use crate::metrics;
use crate::network::grpc;
use crate::CachedSysDb;
use crate::Error;
use crate::GrpcSysDb;
use crate::LeaderElector;
use crate::LeaseStore;
use crate::LocalSysDb;
use crate::LogRepository;
use crate::LogServiceConfig;
use crate::LogStore;
use crate::MetricsLoop;
use crate::Node;
use crate::PurgeLoop;
use crate::Result;
use crate::SledLeaseStore;
use crate::SledLogStore;
use crate::SysDb;
use crate::SysDbConfig;
use crate::SystemError;

pub struct NodeBuilder {
    pub(super) config: LogServiceConfig,
    pub(super) log_store: Option<Arc<dyn LogStore>>,
    pub(super) sysdb: Option<Arc<dyn SysDb>>,
    pub(super) lease_store: Option<Arc<dyn LeaseStore>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) node: Option<Arc<Node>>,
    pub(super) rpc_address: Option<SocketAddr>,
}

impl NodeBuilder {
    /// Loads and validates configuration (defaults, `CONFIG_PATH`, `LOG__*`
    /// env), optionally layered with `config_path`.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = LogServiceConfig::new()?;
        if let Some(p) = config_path {
            info!("with_override_config from: {}", &p);
            config = config.with_override_config(p)?;
        }
        Ok(Self::from_config(config.validate()?, shutdown_signal))
    }

    /// Uses an already validated configuration as-is
    pub fn from_config(
        config: LogServiceConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            log_store: None,
            sysdb: None,
            lease_store: None,
            shutdown_signal,
            node: None,
            rpc_address: None,
        }
    }

    pub fn log_store(
        mut self,
        log_store: Arc<dyn LogStore>,
    ) -> Self {
        self.log_store = Some(log_store);
        self
    }

    pub fn sysdb(
        mut self,
        sysdb: Arc<dyn SysDb>,
    ) -> Self {
        self.sysdb = Some(sysdb);
        self
    }

    pub fn lease_store(
        mut self,
        lease_store: Arc<dyn LeaseStore>,
    ) -> Self {
        self.lease_store = Some(lease_store);
        self
    }

    /// Assembles the node, filling every component not set explicitly with
    /// its default: sled stores under `server.db_root_dir` and a registry
    /// client chosen by `sysdb.endpoint`.
    ///
    /// The default stores are embedded and process-local. Running several
    /// instances against one log requires passing a shared [`LogStore`] and
    /// [`LeaseStore`] through [`Self::log_store`] and [`Self::lease_store`].
    ///
    /// # Errors
    /// Fails when a database cannot be opened or the registry endpoint is
    /// malformed.
    pub fn build(mut self) -> Result<Self> {
        let config = Arc::new(self.config.clone());
        let db_root_dir = &config.server.db_root_dir;

        // Embedded sled databases hold an exclusive lock on their directory,
        // so the defaults can only ever serve this one process.
        let log_store = match self.log_store.take() {
            Some(store) => store,
            None => {
                warn!(
                    "[{}] using the process-local sled log store under {:?}; other instances cannot see these records",
                    config.server.instance_id, db_root_dir
                );
                let db = init_sled_log_db(db_root_dir)?;
                Arc::new(SledLogStore::new(db, config.server.sync_writes)?) as Arc<dyn LogStore>
            }
        };

        let lease_store = match self.lease_store.take() {
            Some(store) => store,
            None => {
                warn!(
                    "[{}] using the process-local sled lease store under {:?}; leadership is exclusive within this process only",
                    config.server.instance_id, db_root_dir
                );
                let db = init_sled_lease_db(db_root_dir)?;
                Arc::new(SledLeaseStore::new(db)?) as Arc<dyn LeaseStore>
            }
        };

        let sysdb = match self.sysdb.take() {
            Some(sysdb) => sysdb,
            None => default_sysdb(&config.sysdb)?,
        };

        let repository = Arc::new(LogRepository::new(
            log_store.clone(),
            sysdb,
            config.retry.append_conflict,
        ));

        let mut elector = LeaderElector::new(
            config.server.instance_id.clone(),
            config.election.clone(),
            lease_store,
        );
        if config.purge.enabled {
            elector.register_task(Arc::new(PurgeLoop::new(
                repository.clone(),
                config.purge.clone(),
                config.retry.purge,
                config.retry.sysdb,
            )));
        }
        if config.metrics_loop.enabled {
            elector.register_task(Arc::new(MetricsLoop::new(
                repository.clone(),
                config.metrics_loop.clone(),
                config.retry.metrics,
                config.retry.sysdb,
            )));
        }

        self.node = Some(Arc::new(Node {
            instance_id: config.server.instance_id.clone(),
            repository,
            store: log_store,
            elector,
            ready: AtomicBool::new(false),
            shutdown_signal: self.shutdown_signal.clone(),
            config,
        }));
        Ok(self)
    }

    /// Launches the Prometheus endpoint when `monitoring.prometheus_enabled`.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        metrics::register_custom_metrics();
        if self.config.monitoring.prometheus_enabled {
            let port = self.config.monitoring.prometheus_port;
            tokio::spawn(async move {
                metrics::start_server(port, shutdown_signal).await;
            });
        }
        self
    }

    /// Binds `server.listen_address` and serves LogService in the
    /// background.
    ///
    /// # Errors
    /// Fails when the node hasn't been built or the address cannot be bound.
    pub async fn start_rpc_server(mut self) -> Result<Self> {
        debug!("--- start RPC server --- ");
        let Some(node) = self.node.clone() else {
            return Err(SystemError::NodeStartFailed("start_rpc_server called before build".to_string()).into());
        };

        let listen_address = self.config.server.listen_address;
        let listener = TcpListener::bind(listen_address)
            .await
            .map_err(|e| Error::Fatal(format!("failed to bind {listen_address}: {e}")))?;
        let bound = listener
            .local_addr()
            .map_err(|e| Error::Fatal(format!("failed to read bound address: {e}")))?;
        info!("LogService listening on {}", bound);
        self.rpc_address = Some(bound);

        let network_config = self.config.network.clone();
        let shutdown = self.shutdown_signal.clone();
        tokio::spawn(async move {
            if let Err(e) = grpc::start_rpc_server(node, listener, network_config, shutdown).await {
                error!("RPC server stops. {:?}", e);
            }
        });
        Ok(self)
    }

    pub fn config(&self) -> &LogServiceConfig {
        &self.config
    }

    /// Address the RPC server is bound to, once started. Differs from
    /// `server.listen_address` when port 0 was requested.
    pub fn rpc_address(&self) -> Option<SocketAddr> {
        self.rpc_address
    }

    /// Returns the built node instance.
    ///
    /// # Errors
    /// Returns `SystemError::NodeStartFailed` if build hasn't completed
    pub fn ready(self) -> Result<Arc<Node>> {
        self.node
            .ok_or_else(|| SystemError::NodeStartFailed("check node ready failed".to_string()).into())
    }
}

/// The in-process registry when no endpoint is configured, otherwise a gRPC
/// client behind a short-TTL existence cache.
fn default_sysdb(config: &SysDbConfig) -> Result<Arc<dyn SysDb>> {
    if config.is_local() {
        info!(
            "using in-process registry with {} collections",
            config.local_collections.len()
        );
        return Ok(Arc::new(LocalSysDb::with_collections(config.local_collections.iter().cloned())));
    }

    info!("using registry at {}", config.endpoint);
    let client: Arc<dyn SysDb> = Arc::new(GrpcSysDb::connect_lazy(config)?);
    if config.existence_cache_ttl_ms == 0 {
        return Ok(client);
    }
    Ok(Arc::new(CachedSysDb::new(
        client,
        Duration::from_millis(config.existence_cache_ttl_ms),
    )))
}
