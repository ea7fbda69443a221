//! Log Service Error Hierarchy
//!
//! Errors are split by the layer that raised them. Callers mostly care about
//! one question, answered by [`Error::is_retryable`]: is this the
//! `Unavailable` class (store or registry unreachable) that background loops
//! may retry, or a definitive answer like `CollectionNotFound`?

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization, registry)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Per-collection log semantics violations
    #[error(transparent)]
    Log(#[from] LogError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The metadata registry does not know this collection
    #[error("Collection {0} not found")]
    CollectionNotFound(String),

    /// Store-level sequencing race on the per-collection counter
    #[error("Sequencing conflict on collection {0}")]
    Conflict(String),

    /// Malformed request (empty batch, empty collection id, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata registry error: {0}")]
    SysDb(#[from] SysDbError),

    #[error("Coordination point error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),

    #[error("Internal server error")]
    ServerUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// Malformed endpoint addresses
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// Retry policy exhaustion on timeouts
    #[error("Retry timeout after {0:?}")]
    RetryTimeoutError(Duration),

    #[error("{0}")]
    SignalSendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// A persisted key or value does not have the expected shape
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SysDbError {
    /// Registry RPC failed
    #[error("Registry request {request} failed: {status}")]
    RequestFailed {
        request: &'static str,
        status: Box<tonic::Status>,
    },

    /// Registry endpoint could not be reached
    #[error("Registry unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// Lease record could not be read or written
    #[error("Lease store failure: {0}")]
    Store(String),
}

// Serialization is classified separately (across protocol layers and system layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

impl Error {
    /// Whether the failure belongs to the `Unavailable`/`Conflict` class that
    /// may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Log(LogError::Conflict(_)) => true,
            Error::Log(_) => false,
            Error::System(SystemError::Serialization(_)) => false,
            Error::System(SystemError::Storage(StorageError::DataCorruption { .. })) => false,
            Error::System(_) => true,
            Error::Config(_) | Error::Fatal(_) => false,
        }
    }

    pub fn is_collection_not_found(&self) -> bool {
        matches!(self, Error::Log(LogError::CollectionNotFound(_)))
    }
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SysDbError> for Error {
    fn from(e: SysDbError) -> Self {
        Error::System(SystemError::SysDb(e))
    }
}

impl From<LeaseError> for Error {
    fn from(e: LeaseError) -> Self {
        Error::System(SystemError::Lease(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        NetworkError::TonicError(Box::new(err)).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

/// Request-facing mapping. Store or registry failures surface as
/// `UNAVAILABLE` so callers own the retry policy.
impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Log(LogError::CollectionNotFound(id)) => {
                tonic::Status::not_found(format!("collection {id} not found"))
            }
            Error::Log(LogError::InvalidArgument(msg)) => tonic::Status::invalid_argument(msg),
            Error::Log(LogError::Conflict(id)) => {
                tonic::Status::unavailable(format!("sequencing conflict on collection {id}"))
            }
            e if e.is_retryable() => tonic::Status::unavailable(e.to_string()),
            e => tonic::Status::internal(e.to_string()),
        }
    }
}
