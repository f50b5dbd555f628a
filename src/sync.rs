//! Whole-file backup and restore of the database against a blob backend.
//!
//! The persistent store is a single flat file, so sync is a whole-file copy
//! in either direction — no deltas, no merge. A failed transfer leaves both
//! sides exactly as they were.

use crate::db::RecordStore;
use crate::error::{InventoryError, Result};
use crate::remote::BlobBackend;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serialises backup and restore of the database file.
///
/// The two operations are mutually exclusive through the transfer lock; the
/// local file phases (full read for backup, full replacement for restore)
/// additionally hold the store's own connection lock, so no CRUD operation
/// interleaves with them. The remote transfer itself runs outside the
/// connection lock and is bounded by the backend's request timeout.
pub struct SyncCoordinator {
    store: Arc<RecordStore>,
    backend: Box<dyn BlobBackend>,
    transfer: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<RecordStore>, backend: Box<dyn BlobBackend>) -> Self {
        Self {
            store,
            backend,
            transfer: Mutex::new(()),
        }
    }

    /// Name of the configured backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Copies the local database file to the backend, overwriting the
    /// remote object.
    ///
    /// Errors name the failing stage: [`InventoryError::LocalReadFailed`]
    /// when the file could not be read, [`InventoryError::RemoteWriteFailed`]
    /// when the upload failed. Either way local state is untouched, and a
    /// failed upload leaves the remote copy as it was.
    pub async fn backup(&self) -> Result<()> {
        let _transfer = self.transfer.lock().await;

        let bytes = self.store.snapshot_bytes()?;
        log::info!(
            "Backing up database ({} bytes) to {} backend",
            bytes.len(),
            self.backend.name()
        );
        self.backend
            .put(bytes)
            .await
            .map_err(InventoryError::RemoteWriteFailed)?;
        log::info!("Backup complete");
        Ok(())
    }

    /// Replaces the local database file with the backend's copy and re-runs
    /// schema initialisation.
    ///
    /// The download completes before the local file is touched; a fetch
    /// failure is [`InventoryError::RemoteReadFailed`] and the local file is
    /// left exactly as it was. The replacement itself is rename-atomic.
    pub async fn restore(&self) -> Result<()> {
        let _transfer = self.transfer.lock().await;

        let bytes = self
            .backend
            .get()
            .await
            .map_err(InventoryError::RemoteReadFailed)?;
        log::info!(
            "Restoring database ({} bytes) from {} backend",
            bytes.len(),
            self.backend.name()
        );
        self.store.replace_from_bytes(&bytes)?;
        log::info!("Restore complete");
        Ok(())
    }
}
