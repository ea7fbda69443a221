// -
// Database namespaces

/// Sled tree holding every retained record of every collection
pub(crate) const LOG_RECORDS_TREE: &str = "log_records";
/// Sled tree holding the per-collection sequencing row (head/tail offsets)
pub(crate) const LOG_META_TREE: &str = "log_meta";
/// Sled tree holding leadership leases
pub(crate) const LEASES_TREE: &str = "leases";

/// Sub directories under `server.db_root_dir`
pub(crate) const LOG_DB_DIR: &str = "log";
pub(crate) const LEASE_DB_DIR: &str = "lease";

/// Offset assigned to the first record of a collection
pub const FIRST_OFFSET: i64 = 1;
