//! Product inventory manager.
//!
//! CRUD and search over a SQLite-backed product table, with whole-file
//! backup and restore of the database against a remote blob backend.

pub mod db;
pub mod error;
pub mod normalize;
pub mod remote;
pub mod sync;
pub mod web;

pub use db::{parse_stock, Product, RecordStore};
pub use error::{InventoryError, RemoteError, Result};
pub use normalize::normalize;
pub use remote::{BlobBackend, DropboxBackend, DropboxConfig, LocalFileBackend};
pub use sync::SyncCoordinator;
