use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Metadata registry ("sysdb") connection
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SysDbConfig {
    /// gRPC endpoint, e.g. `http://sysdb:50051`. Empty selects the in-process
    /// registry (single-node deployments and tests).
    #[serde(default)]
    pub endpoint: String,

    /// Collections pre-registered in the in-process registry. Ignored when
    /// `endpoint` is set.
    #[serde(default)]
    pub local_collections: Vec<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// How long a positive existence answer may be served from cache.
    /// 0 disables caching. Negative answers are never cached.
    #[serde(default = "default_existence_cache_ttl")]
    pub existence_cache_ttl_ms: u64,
}

impl Default for SysDbConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            local_collections: Vec::new(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            existence_cache_ttl_ms: default_existence_cache_ttl(),
        }
    }
}

impl SysDbConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint.is_empty()
            && !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://"))
        {
            return Err(invalid(format!(
                "sysdb.endpoint {} must start with http:// or https://",
                self.endpoint
            )));
        }
        if self.request_timeout_in_ms == 0 || self.connect_timeout_in_ms == 0 {
            return Err(invalid("sysdb timeouts must be > 0"));
        }
        // A cached "exists" masks a deletion for at most this long.
        if self.existence_cache_ttl_ms > 60_000 {
            return Err(invalid(format!(
                "sysdb.existence_cache_ttl_ms {} exceeds 60000",
                self.existence_cache_ttl_ms
            )));
        }
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.endpoint.is_empty()
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    5000
}
fn default_existence_cache_ttl() -> u64 {
    5000
}
