use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use sled::IVec;
use sled::Tree;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use crate::constants::LEASES_TREE;
use crate::time::now_ms;
use crate::LeaseError;
use crate::Result;

/// Proof of a granted lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    pub key: String,
    pub holder: String,
    /// Fencing number, strictly increasing across grants of the same key
    pub epoch: u64,
}

/// Coordination point shared by every instance competing for leadership
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    /// Grants the lease when it is free or expired. `None` when another
    /// holder has an unexpired lease.
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseToken>>;

    /// Extends the lease by `ttl` from now. `false` when the token no longer
    /// owns the lease.
    async fn renew(
        &self,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<bool>;

    /// Expires the lease immediately if the token still owns it.
    async fn release(
        &self,
        token: &LeaseToken,
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    epoch: u64,
    expires_at_ms: i64,
}

impl LeaseRecord {
    fn is_live(
        &self,
        now_ms: i64,
    ) -> bool {
        self.expires_at_ms > now_ms
    }

    fn is_owned_by(
        &self,
        token: &LeaseToken,
    ) -> bool {
        self.holder == token.holder && self.epoch == token.epoch
    }
}

/// Lease records in a sled tree, updated with compare-and-swap.
///
/// Released or expired records are kept (with a past expiry) so the epoch
/// keeps increasing across holders.
pub struct SledLeaseStore {
    tree: Tree,
}

impl SledLeaseStore {
    pub fn new(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(LEASES_TREE)?;
        Ok(Self { tree })
    }

    fn load(
        &self,
        key: &str,
    ) -> Result<(Option<IVec>, Option<LeaseRecord>)> {
        let raw = self.tree.get(key.as_bytes())?;
        let record = match &raw {
            Some(bytes) => Some(
                bincode::deserialize::<LeaseRecord>(bytes)
                    .map_err(|e| LeaseError::Store(format!("corrupt lease {key}: {e}")))?,
            ),
            None => None,
        };
        Ok((raw, record))
    }

    /// Writes `new` only if the stored bytes are still `expected`.
    fn swap(
        &self,
        key: &str,
        expected: Option<IVec>,
        new: &LeaseRecord,
    ) -> Result<bool> {
        let encoded = bincode::serialize(new)?;
        let swapped = self
            .tree
            .compare_and_swap(key.as_bytes(), expected, Some(encoded))?
            .is_ok();
        if swapped {
            self.tree.flush()?;
        }
        Ok(swapped)
    }
}

#[async_trait]
impl LeaseStore for SledLeaseStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseToken>> {
        loop {
            let (raw, current) = self.load(key)?;
            let now = now_ms();

            if let Some(record) = &current {
                if record.is_live(now) && record.holder != holder {
                    trace!("lease {} held by {} until {}", key, record.holder, record.expires_at_ms);
                    return Ok(None);
                }
            }

            let epoch = current.map(|r| r.epoch).unwrap_or(0) + 1;
            let record = LeaseRecord {
                holder: holder.to_string(),
                epoch,
                expires_at_ms: now + ttl.as_millis() as i64,
            };
            if self.swap(key, raw, &record)? {
                debug!("lease {} granted to {} (epoch {})", key, holder, epoch);
                return Ok(Some(LeaseToken {
                    key: key.to_string(),
                    holder: holder.to_string(),
                    epoch,
                }));
            }
            trace!("lease {} changed concurrently, re-reading", key);
        }
    }

    async fn renew(
        &self,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<bool> {
        loop {
            let (raw, current) = self.load(&token.key)?;
            let now = now_ms();

            let Some(mut record) = current else {
                return Ok(false);
            };
            if !record.is_owned_by(token) || !record.is_live(now) {
                debug!("lease {} no longer owned by {} (epoch {})", token.key, token.holder, token.epoch);
                return Ok(false);
            }

            record.expires_at_ms = now + ttl.as_millis() as i64;
            if self.swap(&token.key, raw, &record)? {
                return Ok(true);
            }
        }
    }

    async fn release(
        &self,
        token: &LeaseToken,
    ) -> Result<()> {
        loop {
            let (raw, current) = self.load(&token.key)?;
            let Some(mut record) = current else {
                return Ok(());
            };
            if !record.is_owned_by(token) {
                return Ok(());
            }

            record.expires_at_ms = 0;
            if self.swap(&token.key, raw, &record)? {
                debug!("lease {} released by {}", token.key, token.holder);
                return Ok(());
            }
        }
    }
}
