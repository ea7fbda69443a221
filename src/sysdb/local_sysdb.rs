use dashmap::DashMap;
use tonic::async_trait;
use tracing::debug;

use super::SysDb;
use crate::LogError;
use crate::Result;

/// In-process registry for single-node deployments and tests.
///
/// Tracks each collection's `log_position`, the last offset consumed
/// downstream, exactly like the remote registry does.
#[derive(Debug, Default)]
pub struct LocalSysDb {
    collections: DashMap<String, i64>,
}

impl LocalSysDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collections<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sysdb = Self::new();
        for id in ids {
            sysdb.create_collection(id);
        }
        sysdb
    }

    /// Registers a collection. Re-registering keeps its log position.
    pub fn create_collection(
        &self,
        collection_id: impl Into<String>,
    ) {
        self.collections.entry(collection_id.into()).or_insert(0);
    }

    pub fn delete_collection(
        &self,
        collection_id: &str,
    ) -> bool {
        self.collections.remove(collection_id).is_some()
    }

    pub fn log_position(
        &self,
        collection_id: &str,
    ) -> Option<i64> {
        self.collections.get(collection_id).map(|p| *p)
    }

    /// Records that downstream consumers have applied everything up to and
    /// including `log_position`. Positions never move backwards.
    pub fn advance_log_position(
        &self,
        collection_id: &str,
        log_position: i64,
    ) -> Result<()> {
        let mut entry = self
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| LogError::CollectionNotFound(collection_id.to_string()))?;
        if log_position > *entry {
            debug!("{} log_position {} -> {}", collection_id, *entry, log_position);
            *entry = log_position;
        }
        Ok(())
    }
}

#[async_trait]
impl SysDb for LocalSysDb {
    async fn collection_exists(
        &self,
        collection_id: &str,
    ) -> Result<bool> {
        Ok(self.collections.contains_key(collection_id))
    }

    async fn retention_checkpoint(
        &self,
        collection_id: &str,
    ) -> Result<i64> {
        self.collections
            .get(collection_id)
            .map(|position| position.saturating_add(1))
            .ok_or_else(|| LogError::CollectionNotFound(collection_id.to_string()).into())
    }

    async fn list_active_collections(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
