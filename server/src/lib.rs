use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docseek_core::{Error, IndexStats, IndexingReport, SearchFilters, SearchRequest, SearchResponse, SearchService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const ADMIN_TOKEN_HEADER: &str = "X-ADMIN-TOKEN";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
    pub admin_token: Option<String>,
}

/// Query string of `GET /search`.
#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    pub page_size: Option<usize>,
    /// Comma-separated, e.g. `txt,md`.
    pub file_types: Option<String>,
    pub min_score: Option<f32>,
}
fn default_page() -> usize { 1 }

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self { Self { status, message: message.into() } }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::IndexNotFound(_) => return ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Index not found - run /index first"),
            Error::WriterBusy(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        ApiError::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message, status: self.status.as_u16() })).into_response()
    }
}

/// CORS from a comma-separated origin list; any origin when unset or empty.
pub fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    }
}

pub fn build_app(service: Arc<SearchService>, admin_token: Option<String>, cors: CorsLayer) -> Router {
    let state = AppState { service, admin_token: admin_token.filter(|t| !t.is_empty()) };
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/index", post(index_handler))
        .route("/index/stats", get(stats_handler))
        .route("/search", get(search_get_handler).post(search_post_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run engine work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> docseek_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "docseek full-text search",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "search": "/search",
            "index": "/index",
            "stats": "/index/stats",
            "health": "/health",
        }
    }))
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<IndexingReport>, ApiError> {
    authorize(&state, &headers)?;
    let service = state.service.clone();
    let report = blocking(move || service.index_data_directory()).await?;
    Ok(Json(report))
}

async fn stats_handler(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    let service = state.service.clone();
    Ok(Json(blocking(move || service.stats()).await?))
}

async fn search_get_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let filters = SearchFilters {
        file_types: params.file_types.map(|s| s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()),
        min_score: params.min_score,
        ..Default::default()
    };
    let request = SearchRequest {
        query: params.q,
        page: params.page,
        page_size: params.page_size.unwrap_or(state.service.config().default_page_size),
        filters: if filters.is_empty() { None } else { Some(filters) },
    };
    run_search(state, request).await
}

async fn search_post_handler(State(state): State<AppState>, Json(request): Json<SearchRequest>) -> Result<Json<SearchResponse>, ApiError> {
    run_search(state, request).await
}

/// An empty page becomes 404 here; the engine itself treats it as success.
async fn run_search(state: AppState, request: SearchRequest) -> Result<Json<SearchResponse>, ApiError> {
    let service = state.service.clone();
    let response = blocking(move || service.search(&request)).await?;
    if response.results.items.is_empty() {
        return Err(ApiError::new(StatusCode::NOT_FOUND, format!("No results for '{}'", response.query)));
    }
    Ok(Json(response))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(required) = &state.admin_token else { return Ok(()) };
    let provided = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
