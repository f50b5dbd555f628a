//! Product inventory manager.
//!
//! Serves the inventory web UI and API over a local SQLite file, with
//! optional whole-file backup/restore against a blob backend.

use clap::{Parser, ValueEnum};
use inventory_manager::error::InventoryError;
use inventory_manager::remote::{BlobBackend, DropboxBackend, DropboxConfig, LocalFileBackend};
use inventory_manager::{RecordStore, SyncCoordinator};
use std::path::PathBuf;
use std::sync::Arc;

/// Product inventory server - SQLite-backed stock records with remote backup
#[derive(Parser, Debug)]
#[command(name = "inventory_manager")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Port for the web UI and API
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Blob backend used by backup/restore
    #[arg(long, default_value = "dropbox", env = "SYNC_BACKEND")]
    sync_backend: SyncBackend,

    /// Target file for the local sync backend
    #[arg(long, env = "SYNC_FILE")]
    sync_file: Option<PathBuf>,

    /// Dropbox app key
    #[arg(long, env = "DROPBOX_APP_KEY", hide_env_values = true)]
    dropbox_app_key: Option<String>,

    /// Dropbox app secret
    #[arg(long, env = "DROPBOX_APP_SECRET", hide_env_values = true)]
    dropbox_app_secret: Option<String>,

    /// Dropbox refresh token (see the app's OAuth console for issuing one)
    #[arg(long, env = "DROPBOX_REFRESH_TOKEN", hide_env_values = true)]
    dropbox_refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SyncBackend {
    Dropbox,
    Local,
    None,
}

/// Returns the default database path: ~/.local/share/inventory_manager/inventory.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("inventory_manager")
        .join("inventory.db")
        .to_string_lossy()
        .to_string()
}

/// Builds the configured blob backend. Credentials are validated here, once,
/// before any client exists; `Ok(None)` means sync was disabled explicitly.
fn build_backend(args: &Args) -> Result<Option<Box<dyn BlobBackend>>, InventoryError> {
    match args.sync_backend {
        SyncBackend::None => Ok(None),
        SyncBackend::Local => {
            let path = args.sync_file.clone().ok_or_else(|| {
                InventoryError::Configuration(
                    "--sync-file is required with the local backend".to_string(),
                )
            })?;
            Ok(Some(Box::new(LocalFileBackend::new(path))))
        }
        SyncBackend::Dropbox => {
            let config = DropboxConfig::new(
                args.dropbox_app_key.clone(),
                args.dropbox_app_secret.clone(),
                args.dropbox_refresh_token.clone(),
            )?;
            Ok(Some(Box::new(DropboxBackend::new(config))))
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting inventory_manager...");
    log::info!("Database path: {}", db_path.display());

    let store = match RecordStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // A missing credential disables sync rather than aborting; CRUD stays
    // available either way.
    let sync = match build_backend(&args) {
        Ok(Some(backend)) => {
            let sync = Arc::new(SyncCoordinator::new(Arc::clone(&store), backend));
            log::info!("Sync backend: {}", sync.backend_name());
            Some(sync)
        }
        Ok(None) => {
            log::info!("Sync disabled");
            None
        }
        Err(e) => {
            log::warn!("Sync disabled: {}", e);
            None
        }
    };

    if let Err(e) = inventory_manager::web::serve(store, sync, args.port).await {
        log::error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
