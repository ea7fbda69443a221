use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Lease-based leader election parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    /// Name of the lease all instances compete for
    #[serde(default = "default_lease_key")]
    pub lease_key: String,

    /// Lease time-to-live. Bounds the window in which two instances may both
    /// believe they lead.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_ms: u64,

    /// How often the leader renews; must be well below `lease_ttl_ms`
    #[serde(default = "default_renew_interval")]
    pub renew_interval_ms: u64,

    /// How often a follower retries acquisition
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Random extra delay added to each follower retry
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter_ms: u64,

    /// How long the elector waits for maintenance tasks to stop after
    /// cancelling them
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_key: default_lease_key(),
            lease_ttl_ms: default_lease_ttl(),
            renew_interval_ms: default_renew_interval(),
            retry_interval_ms: default_retry_interval(),
            retry_jitter_ms: default_retry_jitter(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

impl ElectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lease_key.is_empty() {
            return Err(invalid("election.lease_key cannot be empty"));
        }
        if self.lease_ttl_ms == 0 {
            return Err(invalid("election.lease_ttl_ms must be > 0"));
        }
        if self.renew_interval_ms == 0 || self.renew_interval_ms >= self.lease_ttl_ms {
            return Err(invalid(format!(
                "election.renew_interval_ms ({}) must be in (0, lease_ttl_ms = {})",
                self.renew_interval_ms, self.lease_ttl_ms
            )));
        }
        if self.retry_interval_ms == 0 {
            return Err(invalid("election.retry_interval_ms must be > 0"));
        }
        Ok(())
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_millis(self.renew_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

fn default_lease_key() -> String {
    "log-service-leader".to_string()
}
fn default_lease_ttl() -> u64 {
    5000
}
fn default_renew_interval() -> u64 {
    1500
}
fn default_retry_interval() -> u64 {
    2000
}
fn default_retry_jitter() -> u64 {
    500
}
fn default_stop_timeout() -> u64 {
    10_000
}
