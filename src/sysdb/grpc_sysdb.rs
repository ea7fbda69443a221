use std::time::Duration;

use tonic::async_trait;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::Code;
use tracing::debug;
use tracing::warn;

use super::SysDb;
use crate::proto::sysdb::sys_db_client::SysDbClient;
use crate::proto::sysdb::Collection;
use crate::proto::sysdb::GetCollectionsRequest;
use crate::LogError;
use crate::NetworkError;
use crate::Result;
use crate::SysDbConfig;
use crate::SysDbError;

/// Registry client speaking the `chroma.sysdb.SysDb` gRPC service
#[derive(Clone)]
pub struct GrpcSysDb {
    client: SysDbClient<Channel>,
}

impl GrpcSysDb {
    /// Builds a lazily connected client; the first request dials the
    /// endpoint, so a registry outage at startup is not fatal.
    pub fn connect_lazy(config: &SysDbConfig) -> Result<Self> {
        let channel = Endpoint::from_shared(config.endpoint.clone())
            .map_err(|e| {
                warn!("invalid sysdb endpoint {}: {}", config.endpoint, e);
                NetworkError::InvalidURI(config.endpoint.clone())
            })?
            .connect_timeout(Duration::from_millis(config.connect_timeout_in_ms))
            .timeout(Duration::from_millis(config.request_timeout_in_ms))
            .connect_lazy();

        debug!("sysdb client created for {}", config.endpoint);
        Ok(Self {
            client: SysDbClient::new(channel),
        })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: SysDbClient::new(channel),
        }
    }

    async fn get_collections(
        &self,
        id: Option<String>,
    ) -> Result<Vec<Collection>> {
        let lookup = id.is_some();
        let mut client = self.client.clone();
        match client.get_collections(GetCollectionsRequest { id }).await {
            Ok(response) => Ok(response.into_inner().collections),
            Err(status) if lookup && status.code() == Code::NotFound => Ok(Vec::new()),
            Err(status) if status.code() == Code::Unavailable => {
                Err(SysDbError::Unreachable(status.message().to_string()).into())
            }
            Err(status) => Err(SysDbError::RequestFailed {
                request: "GetCollections",
                status: Box::new(status),
            }
            .into()),
        }
    }

    async fn get_collection(
        &self,
        collection_id: &str,
    ) -> Result<Option<Collection>> {
        let collections = self.get_collections(Some(collection_id.to_string())).await?;
        Ok(collections.into_iter().find(|c| c.id == collection_id))
    }
}

#[async_trait]
impl SysDb for GrpcSysDb {
    async fn collection_exists(
        &self,
        collection_id: &str,
    ) -> Result<bool> {
        Ok(self.get_collection(collection_id).await?.is_some())
    }

    async fn retention_checkpoint(
        &self,
        collection_id: &str,
    ) -> Result<i64> {
        match self.get_collection(collection_id).await? {
            Some(collection) => Ok(collection.log_position.saturating_add(1)),
            None => Err(LogError::CollectionNotFound(collection_id.to_string()).into()),
        }
    }

    async fn list_active_collections(&self) -> Result<Vec<String>> {
        Ok(self.get_collections(None).await?.into_iter().map(|c| c.id).collect())
    }
}
