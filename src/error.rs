//! Error types for inventory_manager

use thiserror::Error;

/// Transport-level failure talking to a blob backend
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP error status code
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// The remote object does not exist
    #[error("remote object not found: {0}")]
    Missing(String),
    /// Filesystem failure inside a local backend
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unified error type for inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Malformed or missing required input; nothing was committed
    #[error("validation error: {0}")]
    Validation(String),
    /// Lookup referenced a product that does not exist
    #[error("no product with id {0}")]
    NotFound(i64),
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The database file could not be opened, read, or written
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// Sync backend credentials missing or incomplete; checked before any
    /// network call
    #[error("missing configuration: {0}")]
    Configuration(String),
    /// Backup could not read the local database file
    #[error("backup failed reading the local database: {0}")]
    LocalReadFailed(#[source] std::io::Error),
    /// Backup could not write the remote copy
    #[error("backup failed writing to the remote store: {0}")]
    RemoteWriteFailed(#[source] RemoteError),
    /// Restore could not fetch the remote copy; the local file is untouched
    #[error("restore failed reading from the remote store: {0}")]
    RemoteReadFailed(#[source] RemoteError),
}

/// Result alias for inventory operations
pub type Result<T> = std::result::Result<T, InventoryError>;
