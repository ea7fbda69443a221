use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::watch;

use crate::init_sled_lease_db;
use crate::init_sled_log_db;
use crate::BackoffPolicy;
use crate::LocalSysDb;
use crate::LogRepository;
use crate::LogServiceConfig;
use crate::Node;
use crate::NodeBuilder;
use crate::SledLeaseStore;
use crate::SledLogStore;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub(crate) fn payloads(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

/// Retry policy with millisecond delays so tests stay fast
pub(crate) fn fast_policy(max_retries: usize) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        timeout_ms: 1000,
        base_delay_ms: 1,
        max_delay_ms: 4,
    }
}

/// A repository over a real sled store and an in-process registry
pub(crate) struct RepositoryFixture {
    pub repository: Arc<LogRepository>,
    pub store: Arc<SledLogStore>,
    pub sysdb: Arc<LocalSysDb>,
    _dir: TempDir,
}

pub(crate) fn setup_repository(collections: &[&str]) -> RepositoryFixture {
    let dir = tempfile::tempdir().unwrap();
    let db = init_sled_log_db(dir.path()).unwrap();
    let store = Arc::new(SledLogStore::new(db, false).unwrap());
    let sysdb = Arc::new(LocalSysDb::with_collections(collections.iter().copied()));
    let repository = Arc::new(LogRepository::new(store.clone(), sysdb.clone(), fast_policy(5)));
    RepositoryFixture {
        repository,
        store,
        sysdb,
        _dir: dir,
    }
}

/// A lease store several electors can share, as peers share a coordination
/// point
pub(crate) fn setup_lease_store() -> (Arc<SledLeaseStore>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = init_sled_lease_db(dir.path()).unwrap();
    (Arc::new(SledLeaseStore::new(db).unwrap()), dir)
}

/// Defaults tuned for tests: a temp db root, an ephemeral port, no fsync
/// and fast lease timing.
pub(crate) fn test_config(dir: &TempDir) -> LogServiceConfig {
    let mut config = LogServiceConfig::default();
    config.server.db_root_dir = dir.path().join("db");
    config.server.log_dir = dir.path().join("logs");
    config.server.listen_address = "127.0.0.1:0".parse().unwrap();
    config.server.sync_writes = false;
    config.election.lease_ttl_ms = 300;
    config.election.renew_interval_ms = 60;
    config.election.retry_interval_ms = 30;
    config.election.retry_jitter_ms = 10;
    config.retry.append_conflict = fast_policy(5);
    config
}

/// A built, ready node over sled stores in a temp dir and an in-process
/// registry
pub(crate) struct NodeFixture {
    pub node: Arc<Node>,
    pub sysdb: Arc<LocalSysDb>,
    pub shutdown_tx: watch::Sender<()>,
    _dir: TempDir,
}

pub(crate) fn setup_node(collections: &[&str]) -> NodeFixture {
    setup_node_with(collections, |_| {})
}

pub(crate) fn setup_node_with(
    collections: &[&str],
    customize: impl FnOnce(&mut LogServiceConfig),
) -> NodeFixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    customize(&mut config);

    let sysdb = Arc::new(LocalSysDb::with_collections(collections.iter().copied()));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let node = NodeBuilder::from_config(config, shutdown_rx)
        .sysdb(sysdb.clone())
        .build()
        .unwrap()
        .ready()
        .unwrap();
    node.set_ready(true);
    NodeFixture {
        node,
        sysdb,
        shutdown_tx,
        _dir: dir,
    }
}
