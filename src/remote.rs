//! Blob backends for whole-file database sync.
//!
//! A backend stores exactly one object: the database file. `put` overwrites
//! the remote copy; `get` fetches it, reporting an absent object distinctly
//! from a failed transfer.

use crate::error::{InventoryError, RemoteError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Remote object path for the database file.
const DB_OBJECT_PATH: &str = "/inventory.db";

/// Token endpoint host.
const API_BASE: &str = "https://api.dropboxapi.com";

/// Upload/download host.
const CONTENT_BASE: &str = "https://content.dropboxapi.com";

/// Bound on every remote call, so a transfer can never hang a sync
/// operation indefinitely.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A single-object blob store the database file syncs against.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Backend identifier for log lines (e.g. "dropbox", "local").
    fn name(&self) -> &'static str;

    /// Replaces the stored object with `bytes`.
    async fn put(&self, bytes: Vec<u8>) -> Result<(), RemoteError>;

    /// Fetches the stored object. [`RemoteError::Missing`] when it has never
    /// been uploaded.
    async fn get(&self) -> Result<Vec<u8>, RemoteError>;
}

/// Credential triple for the Dropbox backend.
///
/// Validated in one place, before any client exists; a missing piece is a
/// [`InventoryError::Configuration`] and no network call is ever attempted.
#[derive(Debug, Clone)]
pub struct DropboxConfig {
    app_key: String,
    app_secret: String,
    refresh_token: String,
}

impl DropboxConfig {
    /// Builds the config, naming every missing credential in the error.
    /// Empty or whitespace-only values count as missing.
    pub fn new(
        app_key: Option<String>,
        app_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<Self, InventoryError> {
        let mut missing = Vec::new();
        let app_key = present(app_key, "DROPBOX_APP_KEY", &mut missing);
        let app_secret = present(app_secret, "DROPBOX_APP_SECRET", &mut missing);
        let refresh_token = present(refresh_token, "DROPBOX_REFRESH_TOKEN", &mut missing);
        match (app_key, app_secret, refresh_token) {
            (Some(app_key), Some(app_secret), Some(refresh_token)) => Ok(Self {
                app_key,
                app_secret,
                refresh_token,
            }),
            _ => Err(InventoryError::Configuration(format!(
                "Dropbox credentials not set: {}",
                missing.join(", ")
            ))),
        }
    }
}

fn present(
    value: Option<String>,
    label: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            missing.push(label);
            None
        }
    }
}

/// OAuth2 token endpoint response. Dropbox returns more fields; only the
/// access token matters here.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Dropbox as the remote blob store, authenticated with the long-lived
/// refresh token obtained out-of-band.
pub struct DropboxBackend {
    client: reqwest::Client,
    config: DropboxConfig,
    api_base: String,
    content_base: String,
    object_path: String,
}

impl DropboxBackend {
    pub fn new(config: DropboxConfig) -> Self {
        Self::with_bases(config, API_BASE.to_string(), CONTENT_BASE.to_string())
    }

    /// Backend with overridden hosts — used in tests against a mock server.
    pub fn with_bases(config: DropboxConfig, api_base: String, content_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_base,
            content_base,
            object_path: DB_OBJECT_PATH.to_string(),
        }
    }

    /// Exchanges the refresh token for a short-lived access token.
    async fn access_token(&self) -> Result<String, RemoteError> {
        let url = format!("{}/oauth2/token", self.api_base);
        let response = self
            .client
            .post(&url)
            .timeout(HTTP_TIMEOUT)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("client_id", self.config.app_key.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Dropbox token refresh failed: {}", response.status());
            return Err(RemoteError::HttpStatus(response.status()));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl BlobBackend for DropboxBackend {
    fn name(&self) -> &'static str {
        "dropbox"
    }

    async fn put(&self, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let token = self.access_token().await?;
        let arg = serde_json::json!({
            "path": self.object_path,
            "mode": "overwrite",
            "mute": true,
        });

        let url = format!("{}/2/files/upload", self.content_base);
        let response = self
            .client
            .post(&url)
            .timeout(HTTP_TIMEOUT)
            .bearer_auth(&token)
            .header("Dropbox-API-Arg", arg.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::warn!("Dropbox upload failed: {} ({})", status, body);
            return Err(RemoteError::HttpStatus(status));
        }
        Ok(())
    }

    async fn get(&self) -> Result<Vec<u8>, RemoteError> {
        let token = self.access_token().await?;
        let arg = serde_json::json!({ "path": self.object_path });

        let url = format!("{}/2/files/download", self.content_base);
        let response = self
            .client
            .post(&url)
            .timeout(HTTP_TIMEOUT)
            .bearer_auth(&token)
            .header("Dropbox-API-Arg", arg.to_string())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            // A 409 whose summary names path/not_found means the object was
            // never uploaded; every other conflict is a transfer failure.
            let body = response.text().await.unwrap_or_default();
            if body.contains("not_found") {
                return Err(RemoteError::Missing(self.object_path.clone()));
            }
            log::warn!("Dropbox download conflict: {}", body);
            return Err(RemoteError::HttpStatus(status));
        }
        if !status.is_success() {
            log::warn!("Dropbox download failed: {}", status);
            return Err(RemoteError::HttpStatus(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Blob backend keeping the object at a path on local disk. Also serves as
/// the store behind raw file upload/download deployments without Dropbox.
pub struct LocalFileBackend {
    path: PathBuf,
}

impl LocalFileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BlobBackend for LocalFileBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, bytes: Vec<u8>) -> Result<(), RemoteError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    async fn get(&self) -> Result<Vec<u8>, RemoteError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RemoteError::Missing(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
