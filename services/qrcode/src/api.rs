use crate::config::ApiConfig;
use crate::error::QrServiceError;
use crate::generator::QrGenerator;
use crate::lifecycle::DEFAULT_CUTOFF_DAYS;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

const SERVICE_TITLE: &str = "QR Code Generator";
const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<QrGenerator>,
}

/// Body of `POST /generate`
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub url: String,
    /// Run a cleanup pass after storing the new code
    #[serde(default = "default_true", alias = "cleanup")]
    pub cleanup_on_generate: bool,
}

fn default_true() -> bool {
    true
}

/// Response of `POST /generate`
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    /// Path of the stored image
    pub path: Option<String>,
    /// Path of the artifact folder; its last segment is the folder name
    pub folder: Option<String>,
    pub message: String,
}

/// Query parameters of `POST /cleanup`
#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    #[serde(default = "default_cleanup_days")]
    pub days: u32,
}

fn default_cleanup_days() -> u32 {
    DEFAULT_CUTOFF_DAYS
}

/// Response of `POST /cleanup`
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted_count: usize,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Error returned by handlers, rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// Map a service error onto a response.
    ///
    /// Server-side failures are logged in full and reported to the client
    /// with `failure` only.
    fn from_service(err: QrServiceError, not_found: &str, failure: &str) -> Self {
        match err {
            QrServiceError::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            QrServiceError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, not_found),
            other => {
                error!(error = %other, "{failure}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, failure)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
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
                .filter_map(|o| o.parse().ok())
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
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/generate", post(generate_qr))
        .route("/qr/:folder_name", get(get_qr_image))
        .route("/metadata/:folder_name", get(get_metadata))
        .route("/cleanup", post(cleanup_qrcodes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Service information
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": format!("{SERVICE_TITLE} API"),
        "version": API_VERSION,
        "endpoints": {
            "generate": "/generate (POST)",
            "retrieve_qr": "/qr/{folder_name} (GET)",
            "retrieve_metadata": "/metadata/{folder_name} (GET)",
            "cleanup": "/cleanup (POST)",
            "health": "/health (GET)"
        }
    }))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_TITLE
    }))
}

/// Generate a QR code for the submitted URL
#[instrument(skip(state, payload))]
async fn generate_qr(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload?;

    let generated = state
        .generator
        .generate(&request.url, request.cleanup_on_generate)
        .await
        .map_err(|e| ApiError::from_service(e, "QR code not found", "Failed to generate QR code"))?;

    Ok(Json(GenerateResponse {
        success: true,
        path: Some(generated.path.display().to_string()),
        folder: Some(generated.folder.display().to_string()),
        message: format!(
            "QR code generated successfully for {}",
            generated.metadata.url
        ),
    }))
}

/// Raw PNG of a stored QR code
#[instrument(skip(state))]
async fn get_qr_image(
    State(state): State<AppState>,
    Path(folder_name): Path<String>,
) -> Result<Response, ApiError> {
    let image = state
        .generator
        .image(&folder_name)
        .await
        .map_err(|e| ApiError::from_service(e, "QR code not found", "Internal server error"))?;

    Ok((
        [(header::CONTENT_TYPE, state.generator.content_type())],
        image,
    )
        .into_response())
}

/// Metadata record of a stored QR code
#[instrument(skip(state))]
async fn get_metadata(
    State(state): State<AppState>,
    Path(folder_name): Path<String>,
) -> Result<Response, ApiError> {
    let metadata = state
        .generator
        .metadata(&folder_name)
        .await
        .map_err(|e| ApiError::from_service(e, "Metadata not found", "Internal server error"))?;

    Ok(Json(metadata).into_response())
}

/// Delete folders older than `days`
#[instrument(skip(state, query))]
async fn cleanup_qrcodes(
    State(state): State<AppState>,
    query: Result<Query<CleanupQuery>, QueryRejection>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Query(CleanupQuery { days }) = query?;

    let report = state
        .generator
        .lifecycle()
        .cleanup(days)
        .await
        .map_err(|e| ApiError::from_service(e, "Storage not found", "Cleanup failed"))?;

    let mut message = format!(
        "Deleted {} QR code folder(s) older than {} day(s)",
        report.deleted_count, days
    );
    if report.failed_count > 0 {
        message.push_str(&format!("; {} could not be deleted", report.failed_count));
    }

    Ok(Json(CleanupResponse {
        success: true,
        deleted_count: report.deleted_count,
        message,
    }))
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting QR code API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
