use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::validate_directory;
use crate::Result;

const HOSTNAME_ENV: &str = "HOSTNAME";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Identity of this instance as a lease holder and the name of its log
    /// directory under `log_dir`. Must be unique across the fleet and stable
    /// across restarts, so production deployments should set it. When unset
    /// it is derived from `HOSTNAME`, or generated if that is missing too.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Flush the store to disk before acknowledging an append
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            listen_address: default_listen_addr(),
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
            sync_writes: default_sync_writes(),
        }
    }
}

impl ServerConfig {
    /// Validates server configuration consistency
    /// # Errors
    /// Returns `Error::Config` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.instance_id.trim().is_empty() {
            return Err(invalid("instance_id cannot be empty"));
        }

        if self.listen_address.port() == 0 {
            return Err(invalid("listen_address must specify a non-zero port"));
        }

        validate_directory(&self.db_root_dir, "db_root_dir")?;
        validate_directory(&self.log_dir, "log_dir")?;

        Ok(())
    }
}

fn default_instance_id() -> String {
    match std::env::var(HOSTNAME_ENV) {
        Ok(host) if !host.trim().is_empty() => format!("log-service-{}", host.trim()),
        _ => format!("log-service-{}", nanoid::nanoid!(10)),
    }
}
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50052))
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/log-service/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/log-service/logs")
}
fn default_sync_writes() -> bool {
    true
}
