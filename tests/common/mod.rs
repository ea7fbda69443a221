use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log_service::proto::log::log_service_client::LogServiceClient;
use log_service::proto::log::OperationRecord;
use log_service::proto::log::PullLogsRequest;
use log_service::proto::log::PushLogsRequest;
use log_service::proto::log::ScoutLogsRequest;
use log_service::proto::log::ScoutLogsResponse;
use log_service::BackoffPolicy;
use log_service::LeaseStore;
use log_service::LocalSysDb;
use log_service::LogServiceConfig;
use log_service::LogStore;
use log_service::Node;
use log_service::NodeBuilder;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

pub const WAIT_FOR_NODE_READY_IN_SEC: u64 = 5;

/// Defaults for a node on an ephemeral port with fast lease and loop timing
pub fn test_config(db_root: &TempDir) -> LogServiceConfig {
    let mut config = LogServiceConfig::default();
    config.server.db_root_dir = db_root.path().join("db");
    config.server.log_dir = db_root.path().join("logs");
    config.server.listen_address = "127.0.0.1:0".parse().unwrap();
    config.server.sync_writes = false;
    config.election.lease_ttl_ms = 400;
    config.election.renew_interval_ms = 100;
    config.election.retry_interval_ms = 50;
    config.election.retry_jitter_ms = 20;
    config.purge.interval_ms = 100;
    config.metrics_loop.interval_ms = 100;
    config.retry.purge = BackoffPolicy {
        max_retries: 2,
        timeout_ms: 1000,
        base_delay_ms: 10,
        max_delay_ms: 50,
    };
    config
}

/// Components several nodes can share, the way a fleet shares the store,
/// the registry and the coordination point
#[derive(Clone, Default)]
pub struct Shared {
    pub sysdb: Option<Arc<LocalSysDb>>,
    pub log_store: Option<Arc<dyn LogStore>>,
    pub lease_store: Option<Arc<dyn LeaseStore>>,
}

pub struct TestNode {
    pub node: Arc<Node>,
    pub addr: SocketAddr,
    pub shutdown_tx: watch::Sender<()>,
    pub handle: JoinHandle<log_service::Result<()>>,
}

impl TestNode {
    pub async fn client(&self) -> LogServiceClient<Channel> {
        LogServiceClient::connect(format!("http://{}", self.addr)).await.unwrap()
    }

    pub async fn shutdown(self) {
        self.shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(WAIT_FOR_NODE_READY_IN_SEC), self.handle)
            .await
            .expect("node did not stop in time")
            .unwrap()
            .unwrap();
    }
}

/// Builds, serves and runs a node, returning once it accepts requests
pub async fn start_node(
    config: LogServiceConfig,
    shared: Shared,
) -> TestNode {
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let mut builder = NodeBuilder::from_config(config, shutdown_rx.clone());
    if let Some(sysdb) = shared.sysdb {
        builder = builder.sysdb(sysdb);
    }
    if let Some(store) = shared.log_store {
        builder = builder.log_store(store);
    }
    if let Some(store) = shared.lease_store {
        builder = builder.lease_store(store);
    }

    let builder = builder
        .build()
        .unwrap()
        .start_metrics_server(shutdown_rx)
        .start_rpc_server()
        .await
        .unwrap();
    let addr = builder.rpc_address().unwrap();
    let node = builder.ready().unwrap();

    let runner = node.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    wait_until(|| node.server_is_ready()).await;

    TestNode {
        node,
        addr,
        shutdown_tx,
        handle,
    }
}

/// Polls `condition` every 10ms until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(WAIT_FOR_NODE_READY_IN_SEC), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn push(
    client: &mut LogServiceClient<Channel>,
    collection_id: &str,
    items: &[&str],
) -> Result<Vec<i64>, tonic::Status> {
    let request = PushLogsRequest {
        collection_id: collection_id.to_string(),
        records: items
            .iter()
            .map(|s| OperationRecord {
                payload: s.as_bytes().to_vec(),
            })
            .collect(),
    };
    Ok(client.push_logs(request).await?.into_inner().offsets)
}

pub async fn pull(
    client: &mut LogServiceClient<Channel>,
    collection_id: &str,
    start_from_offset: i64,
    batch_size: i32,
) -> Result<Vec<(i64, String)>, tonic::Status> {
    let request = PullLogsRequest {
        collection_id: collection_id.to_string(),
        start_from_offset,
        batch_size,
    };
    Ok(client
        .pull_logs(request)
        .await?
        .into_inner()
        .records
        .into_iter()
        .map(|r| (r.log_offset, String::from_utf8(r.payload).unwrap()))
        .collect())
}

pub async fn scout(
    client: &mut LogServiceClient<Channel>,
    collection_id: &str,
) -> Result<ScoutLogsResponse, tonic::Status> {
    let request = ScoutLogsRequest {
        collection_id: collection_id.to_string(),
    };
    Ok(client.scout_logs(request).await?.into_inner())
}
