use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use tonic::async_trait;
use tracing::trace;

use super::SysDb;
use crate::Result;

/// Short-TTL existence cache in front of another registry client.
///
/// Only positive answers are cached, and only for `ttl`, so a deleted
/// collection stops being accepted at most `ttl` after the registry forgets
/// it. Checkpoints and listings always go to the inner client.
pub struct CachedSysDb {
    inner: Arc<dyn SysDb>,
    ttl: Duration,
    known: DashMap<String, Instant>,
}

impl CachedSysDb {
    pub fn new(
        inner: Arc<dyn SysDb>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            ttl,
            known: DashMap::new(),
        }
    }

    pub fn invalidate(
        &self,
        collection_id: &str,
    ) {
        self.known.remove(collection_id);
    }
}

#[async_trait]
impl SysDb for CachedSysDb {
    async fn collection_exists(
        &self,
        collection_id: &str,
    ) -> Result<bool> {
        if let Some(checked_at) = self.known.get(collection_id) {
            if checked_at.elapsed() < self.ttl {
                trace!("existence cache hit for {}", collection_id);
                return Ok(true);
            }
        }

        let exists = self.inner.collection_exists(collection_id).await?;
        if exists {
            self.known.insert(collection_id.to_string(), Instant::now());
        } else {
            self.known.remove(collection_id);
        }
        Ok(exists)
    }

    async fn retention_checkpoint(
        &self,
        collection_id: &str,
    ) -> Result<i64> {
        let result = self.inner.retention_checkpoint(collection_id).await;
        if matches!(&result, Err(e) if e.is_collection_not_found()) {
            self.invalidate(collection_id);
        }
        result
    }

    async fn list_active_collections(&self) -> Result<Vec<String>> {
        self.inner.list_active_collections().await
    }
}
