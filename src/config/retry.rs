use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (at least one attempt is always made)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(invalid(format!("retry.{name}.timeout_ms must be > 0")));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Transparent retry of sequencing conflicts inside append
    #[serde(default = "default_append_conflict")]
    pub append_conflict: BackoffPolicy,

    /// Per-collection purge within one cycle
    #[serde(default = "default_purge")]
    pub purge: BackoffPolicy,

    /// Per-collection stats within one cycle
    #[serde(default = "default_metrics")]
    pub metrics: BackoffPolicy,

    /// Registry lookups issued by background loops
    #[serde(default = "default_sysdb")]
    pub sysdb: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            append_conflict: default_append_conflict(),
            purge: default_purge(),
            metrics: default_metrics(),
            sysdb: default_sysdb(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.append_conflict.validate("append_conflict")?;
        self.purge.validate("purge")?;
        self.metrics.validate("metrics")?;
        self.sysdb.validate("sysdb")?;
        Ok(())
    }
}

fn default_append_conflict() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        timeout_ms: 1000,
        base_delay_ms: 1,
        max_delay_ms: 50,
    }
}
fn default_purge() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 30_000,
        base_delay_ms: 200,
        max_delay_ms: 2000,
    }
}
fn default_metrics() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 2,
        timeout_ms: 5000,
        base_delay_ms: 100,
        max_delay_ms: 1000,
    }
}
fn default_sysdb() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 5000,
        base_delay_ms: 100,
        max_delay_ms: 2000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
