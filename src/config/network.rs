use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// gRPC server parameters for the request-facing LogService
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Max concurrent requests per connection
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// TCP keepalive in seconds
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// Accept and send gzip-compressed messages
    #[serde(default = "default_gzip")]
    pub gzip: bool,

    /// Upper bound on `batch_size` accepted by PullLogs
    #[serde(default = "default_max_pull_batch_size")]
    pub max_pull_batch_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            tcp_nodelay: default_tcp_nodelay(),
            gzip: default_gzip(),
            max_pull_batch_size: default_max_pull_batch_size(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(invalid("network.concurrency_limit must be > 0"));
        }
        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(invalid(format!(
                "network.http2_keep_alive_timeout_in_secs ({}) must be shorter than the interval ({})",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            )));
        }
        if self.max_pull_batch_size == 0 {
            return Err(invalid("network.max_pull_batch_size must be > 0"));
        }
        Ok(())
    }
}

fn default_concurrency_limit() -> usize {
    8192
}
fn default_tcp_keepalive() -> u64 {
    3600
}
fn default_h2_keepalive_interval() -> u64 {
    300
}
fn default_h2_keepalive_timeout() -> u64 {
    20
}
fn default_tcp_nodelay() -> bool {
    true
}
fn default_gzip() -> bool {
    true
}
fn default_max_pull_batch_size() -> usize {
    10_000
}
