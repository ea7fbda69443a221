use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Retention purge loop (leader only)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PurgeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_purge_interval")]
    pub interval_ms: u64,

    /// Drop logs of collections the registry no longer reports
    #[serde(default = "default_enabled")]
    pub drop_orphaned_logs: bool,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_purge_interval(),
            drop_orphaned_logs: default_enabled(),
        }
    }
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.interval_ms < 100 {
            return Err(invalid(format!(
                "purge.interval_ms {} must be at least 100",
                self.interval_ms
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Backlog metrics loop (leader only)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsLoopConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_metrics_interval")]
    pub interval_ms: u64,
}

impl Default for MetricsLoopConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_metrics_interval(),
        }
    }
}

impl MetricsLoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.interval_ms < 100 {
            return Err(invalid(format!(
                "metrics_loop.interval_ms {} must be at least 100",
                self.interval_ms
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_enabled() -> bool {
    true
}
fn default_purge_interval() -> u64 {
    60_000
}
fn default_metrics_interval() -> u64 {
    10_000
}
