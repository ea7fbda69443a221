//! gRPC server for the request-facing LogService.

mod grpc_log_service;


//-------------------------------------------------------------------------------
// Start RPC Server
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codec::CompressionEncoding;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::proto::log::log_service_server::LogServiceServer;
use crate::NetworkConfig;
use crate::Node;
use crate::Result;
use crate::SystemError;

/// Serves LogService and the standard health service on an already bound
/// listener until `shutdown_signal` fires.
pub(crate) async fn start_rpc_server(
    node: Arc<Node>,
    listener: TcpListener,
    config: NetworkConfig,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let listen_address = listener.local_addr().map_err(|e| SystemError::NodeStartFailed(e.to_string()))?;

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter.set_serving::<LogServiceServer<Node>>().await;

    let mut log_service = LogServiceServer::from_arc(node);
    if config.gzip {
        log_service = log_service
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
    }

    let mut server_builder = tonic::transport::Server::builder()
        .concurrency_limit_per_connection(config.concurrency_limit)
        .tcp_keepalive(Some(Duration::from_secs(config.tcp_keepalive_in_secs)))
        .http2_keepalive_interval(Some(Duration::from_secs(config.http2_keep_alive_interval_in_secs)))
        .http2_keepalive_timeout(Some(Duration::from_secs(config.http2_keep_alive_timeout_in_secs)))
        .tcp_nodelay(config.tcp_nodelay);

    if let Err(e) = server_builder
        .add_service(health_service)
        .add_service(log_service)
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown_signal.changed().map(|_s| {
                warn!("Stopping RPC server. {}", listen_address);
            }),
        )
        .await
    {
        error!("error to start rpc server :{:?}.", e);
        return Err(SystemError::ServerUnavailable.into());
    }
    debug!("rpc service finished!");
    Ok(())
}
