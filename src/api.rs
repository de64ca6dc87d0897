use crate::admin_api;
use crate::config::ApiConfig;
use crate::listing_store::ListingStore;
use crate::listings_api;
use crate::lookup_store::LookupStore;
use crate::media_library::{MediaError, MediaStore};
use crate::sync::AssociationSynchronizer;
use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub listings: ListingStore,
    pub lookups: LookupStore,
    pub sync: AssociationSynchronizer,
    /// Media host client; absent when credentials are not configured
    pub media: Option<Arc<dyn MediaStore>>,
    /// Hostname suffix recognized when deriving asset ids from URLs
    pub delivery_host_suffix: String,
    /// Shared admin credential; absent means the admin surface answers 503
    pub admin_secret: Option<String>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldIssue>>,
}

/// One field-level validation problem
#[derive(Debug, Clone, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Error shape returned from handlers
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_body(status: StatusCode, error: &str, code: &str, details: Option<Vec<FieldIssue>>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
            details,
        }),
    )
}

/// Malformed or out-of-range input; nothing was mutated
pub fn validation_error(error: &str, issues: Vec<FieldIssue>) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, error, "VALIDATION_ERROR", Some(issues))
}

/// Missing or incorrect admin credential
pub fn unauthorized() -> ApiError {
    error_body(StatusCode::UNAUTHORIZED, "Unauthorized", "UNAUTHORIZED", None)
}

/// Admin secret not configured on the server
pub fn admin_not_configured() -> ApiError {
    error_body(
        StatusCode::SERVICE_UNAVAILABLE,
        "Admin secret is not configured on the server",
        "ADMIN_NOT_CONFIGURED",
        None,
    )
}

/// Referenced listing id absent
pub fn not_found() -> ApiError {
    error_body(StatusCode::NOT_FOUND, "Not found", "NOT_FOUND", None)
}

/// Anything unexpected; details stay server-side
pub fn internal_error(error: &str) -> ApiError {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, error, "INTERNAL_ERROR", None)
}

/// Map a media host failure onto the client-visible taxonomy
pub fn media_error(err: &MediaError) -> ApiError {
    match err {
        MediaError::NotConfigured => error_body(
            StatusCode::BAD_REQUEST,
            "Media host is not configured; cannot upload image data",
            "MEDIA_NOT_CONFIGURED",
            None,
        ),
        _ => error_body(
            StatusCode::BAD_GATEWAY,
            "Media host request failed",
            "UPSTREAM_ERROR",
            None,
        ),
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/listings", get(listings_api::search_listings))
        .route("/api/listings/filters", get(listings_api::filter_vocabulary))
        .route(
            "/api/admin/listings",
            get(admin_api::list_listings).post(admin_api::create_listing),
        )
        .route(
            "/api/admin/listings/:id",
            get(admin_api::get_listing)
                .patch(admin_api::update_listing)
                .delete(admin_api::delete_listing),
        )
        .route("/api/admin/listings/:id/status", patch(admin_api::update_status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "listings-service"
    }))
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting listings API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router).await.context("API server error")?;

    Ok(())
}
