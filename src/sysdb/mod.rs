//! Metadata registry ("sysdb") client.
//!
//! The registry is the source of truth for collection existence and for the
//! retention checkpoint: the lowest offset downstream consumers of a
//! collection still need.
mod cached_sysdb;
mod grpc_sysdb;
mod local_sysdb;


pub use cached_sysdb::*;
pub use grpc_sysdb::*;
pub use local_sysdb::*;

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SysDb: Send + Sync + 'static {
    async fn collection_exists(
        &self,
        collection_id: &str,
    ) -> Result<bool>;

    /// Minimum offset still required downstream. Every offset below it may
    /// be deleted.
    ///
    /// # Errors
    /// `LogError::CollectionNotFound` when the registry does not know the
    /// collection.
    async fn retention_checkpoint(
        &self,
        collection_id: &str,
    ) -> Result<i64>;

    async fn list_active_collections(&self) -> Result<Vec<String>>;
}
