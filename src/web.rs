//! Web server for the inventory UI and API.
//!
//! JSON endpoints for CRUD, search, and sync, plus raw upload/download of
//! the database file. The core returns typed errors; mapping them to HTTP
//! statuses happens here and nowhere else.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::{parse_stock, Product, RecordStore};
use crate::error::InventoryError;
use crate::sync::SyncCoordinator;

/// Largest accepted database upload.
const MAX_DB_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state. `sync` is absent when the server was started
/// without a configured backend.
#[derive(Clone)]
struct AppState {
    store: Arc<RecordStore>,
    sync: Option<Arc<SyncCoordinator>>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Add-product form: stock arrives as the raw string the form submitted.
#[derive(Deserialize)]
struct AddProduct {
    name: String,
    #[serde(default)]
    stock: String,
}

#[derive(Deserialize)]
struct UpdateStock {
    #[serde(default)]
    stock: String,
}

/// Search query parameters
#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    in_stock_only: bool,
}

fn ok_json<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
    .into_response()
}

fn error_json(context: &str, err: InventoryError) -> Response {
    log::error!("Error {}: {}", context, err);
    let status = error_status(&err);
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }),
    )
        .into_response()
}

fn error_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        InventoryError::RemoteWriteFailed(_) | InventoryError::RemoteReadFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        InventoryError::Database(_)
        | InventoryError::StorageUnavailable(_)
        | InventoryError::LocalReadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET / - Serve the web UI (single HTML page)
async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// GET /api/products
async fn list_handler(State(state): State<AppState>) -> Response {
    match state.store.list_all() {
        Ok(products) => ok_json(products),
        Err(e) => error_json("listing products", e),
    }
}

/// POST /api/products
async fn add_handler(State(state): State<AppState>, Json(body): Json<AddProduct>) -> Response {
    let stock = parse_stock(&body.stock);
    match state.store.add(&body.name, stock) {
        Ok(product) => ok_json(product),
        Err(e) => error_json("adding product", e),
    }
}

/// GET /api/products/{id}
async fn get_handler(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.get(id) {
        Ok(product) => ok_json(product),
        Err(e) => error_json("fetching product", e),
    }
}

/// POST /api/products/{id}/stock
async fn update_stock_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStock>,
) -> Response {
    let stock = parse_stock(&body.stock);
    match state.store.update_stock(id, stock) {
        Ok(affected) => ok_json(affected),
        Err(e) => error_json("updating stock", e),
    }
}

/// DELETE /api/products/{id}
async fn delete_handler(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.delete(id) {
        Ok(affected) => ok_json(affected),
        Err(e) => error_json("deleting product", e),
    }
}

/// GET /api/search?q={query}&in_stock_only={bool}
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    match state.store.search(&params.q, params.in_stock_only) {
        Ok(products) => ok_json(products),
        Err(e) => error_json("searching products", e),
    }
}

fn sync_unconfigured() -> InventoryError {
    InventoryError::Configuration("no sync backend configured".to_string())
}

/// POST /api/backup
async fn backup_handler(State(state): State<AppState>) -> Response {
    match &state.sync {
        Some(sync) => match sync.backup().await {
            Ok(()) => ok_json("backup complete"),
            Err(e) => error_json("backing up database", e),
        },
        None => error_json("backing up database", sync_unconfigured()),
    }
}

/// POST /api/restore
async fn restore_handler(State(state): State<AppState>) -> Response {
    match &state.sync {
        Some(sync) => match sync.restore().await {
            Ok(()) => ok_json("restore complete"),
            Err(e) => error_json("restoring database", e),
        },
        None => error_json("restoring database", sync_unconfigured()),
    }
}

/// GET /api/db - download the raw database file
async fn download_db_handler(State(state): State<AppState>) -> Response {
    match state.store.snapshot_bytes() {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"inventory.db\"",
            )
            .body(Body::from(bytes))
            .unwrap(),
        Err(e) => error_json("reading database file", e),
    }
}

/// POST /api/db - replace the database file with the uploaded bytes.
/// Same exclusive replacement discipline as a restore.
async fn upload_db_handler(State(state): State<AppState>, body: Bytes) -> Response {
    if body.is_empty() {
        return error_json(
            "replacing database file",
            InventoryError::Validation("no database file in upload".to_string()),
        );
    }
    match state.store.replace_from_bytes(&body) {
        Ok(()) => ok_json("database replaced"),
        Err(e) => error_json("replacing database file", e),
    }
}

/// Build the web server router
pub fn create_router(store: Arc<RecordStore>, sync: Option<Arc<SyncCoordinator>>) -> Router {
    let state = AppState { store, sync };

    Router::new()
        .route("/", get(index_handler))
        .route("/api/products", get(list_handler).post(add_handler))
        .route(
            "/api/products/{id}",
            get(get_handler).delete(delete_handler),
        )
        .route("/api/products/{id}/stock", post(update_stock_handler))
        .route("/api/search", get(search_handler))
        .route("/api/backup", post(backup_handler))
        .route("/api/restore", post(restore_handler))
        .route("/api/db", get(download_db_handler).post(upload_db_handler))
        .layer(DefaultBodyLimit::max(MAX_DB_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server (async)
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
/// When running locally, use firewall rules to restrict access.
pub async fn serve(
    store: Arc<RecordStore>,
    sync: Option<Arc<SyncCoordinator>>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(store, sync);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("Inventory UI listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (Arc<RecordStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store =
            Arc::new(RecordStore::open(temp_dir.path().join("inventory.db")).unwrap());
        (store, temp_dir)
    }

    #[test]
    fn test_create_router_without_sync() {
        let (store, _dir) = create_test_store();
        let _router = create_router(store, None);
    }

    #[test]
    fn test_app_state_clone() {
        let (store, _dir) = create_test_store();
        let state = AppState { store, sync: None };
        let _state2 = state.clone();
    }

    #[test]
    fn test_api_response_serialization() {
        let response: ApiResponse<Vec<i32>> = ApiResponse {
            success: true,
            data: Some(vec![1, 2, 3]),
            error: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"data\":[1,2,3]"));
    }

    #[test]
    fn test_api_response_error_serialization() {
        let response: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some("Test error".to_string()),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"error\":\"Test error\""));
        // data should be omitted when None
        assert!(!json.contains("\"data\""));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&InventoryError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&InventoryError::NotFound(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&sync_unconfigured()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_search_params_defaults() {
        let params: SearchParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.q, "");
        assert!(!params.in_stock_only);
    }

    #[test]
    fn test_product_serialization() {
        let product = Product {
            id: 1,
            name: "Widget".to_string(),
            sku: "PROD001".to_string(),
            stock: 4,
        };
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("\"sku\":\"PROD001\""));
        assert!(json.contains("\"stock\":4"));
    }
}
