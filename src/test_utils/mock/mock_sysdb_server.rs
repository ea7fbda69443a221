use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Channel;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;

use crate::proto::sysdb::sys_db_server::SysDb as SysDbService;
use crate::proto::sysdb::sys_db_server::SysDbServer;
use crate::proto::sysdb::Collection;
use crate::proto::sysdb::GetCollectionsRequest;
use crate::proto::sysdb::GetCollectionsResponse;
use crate::LocalSysDb;
use crate::Result;
use crate::StorageError;

/// Serves the registry gRPC API from a [`LocalSysDb`]
pub struct MockSysDbServer {
    registry: Arc<LocalSysDb>,
    /// Reply `UNAVAILABLE` to every request
    pub(crate) unavailable: bool,
}

#[tonic::async_trait]
impl SysDbService for MockSysDbServer {
    async fn get_collections(
        &self,
        request: Request<GetCollectionsRequest>,
    ) -> std::result::Result<Response<GetCollectionsResponse>, Status> {
        if self.unavailable {
            return Err(Status::unavailable("registry down"));
        }

        let ids = match request.into_inner().id {
            Some(id) => vec![id],
            None => {
                use crate::SysDb;
                self.registry
                    .list_active_collections()
                    .await
                    .map_err(|e| Status::internal(e.to_string()))?
            }
        };

        let collections = ids
            .into_iter()
            .filter_map(|id| {
                self.registry
                    .log_position(&id)
                    .map(|log_position| Collection { id, log_position })
            })
            .collect();
        Ok(Response::new(GetCollectionsResponse { collections }))
    }
}

impl MockSysDbServer {
    pub fn new(registry: Arc<LocalSysDb>) -> Self {
        Self {
            registry,
            unavailable: false,
        }
    }

    pub async fn spawn(
        self,
        rx: oneshot::Receiver<()>,
    ) -> Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(StorageError::IoError)?;
        let addr = listener.local_addr().map_err(StorageError::IoError)?;
        debug!("starting mock sysdb service: {}", addr);

        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(SysDbServer::new(self))
                .serve_with_incoming_shutdown(tokio_stream::wrappers::TcpListenerStream::new(listener), async {
                    rx.await.ok();
                })
                .await
                .unwrap();
        });

        Ok(addr)
    }

    pub async fn channel(addr: SocketAddr) -> Channel {
        Channel::from_shared(format!("http://{addr}"))
            .expect("valid address")
            .connect()
            .await
            .expect("connection failed")
    }
}
