use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use engine::{Engine, EngineError, EngineStats, FlushOutcome, SearchHit, SearchMethod};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub k: Option<i64>,
}
fn default_method() -> String { "text".into() }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub method: SearchMethod,
    pub generation: u64,
    pub total_hits: usize,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
}

#[derive(Deserialize)]
pub struct AddDocumentRequest {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "content")]
    pub body: String,
}

#[derive(Serialize)]
pub struct AddDocumentResponse {
    pub accepted: bool,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub title: String,
    pub body: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Bounds how many searches execute at once on the blocking pool.
    pub search_permits: Arc<Semaphore>,
    pub search_timeout: Duration,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, admin_token: Option<String>) -> Self {
        Self {
            search_permits: Arc::new(Semaphore::new(engine.config().search_workers)),
            search_timeout: engine.config().search_timeout(),
            engine,
            admin_token,
        }
    }
}

pub fn build_app(engine: Arc<Engine>, admin_token: Option<String>) -> Router {
    router(AppState::new(engine, admin_token))
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/documents", post(add_document_handler))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/stats", get(stats_handler))
        .route("/index/commit", post(index_commit))
        .with_state(app_state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

// CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
fn cors_layer() -> CorsLayer {
    let any = || CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                any()
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => any(),
    }
}

pub async fn add_document_handler(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentRequest>,
) -> Result<Json<AddDocumentResponse>, ApiError> {
    let accepted = state.engine.add_document(req.id, req.title, req.body).map_err(api_error)?;
    Ok(Json(AddDocumentResponse { accepted }))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let method: SearchMethod = params.method.parse().map_err(api_error)?;
    let k = state.engine.config().resolve_k(params.k).map_err(api_error)?;

    // Waiting for a worker spends the same budget as the search itself.
    let budget = state.search_timeout;
    let permit = tokio::time::timeout(budget, Arc::clone(&state.search_permits).acquire_owned())
        .await
        .map_err(|_| api_error(EngineError::DeadlineExceeded(budget)))?
        .map_err(|e| api_error(EngineError::internal(e.to_string())))?;
    let remaining = budget.saturating_sub(start.elapsed());
    let engine = Arc::clone(&state.engine);
    let query = params.q.clone();
    let results = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        engine.search_within(&query, method, k, remaining)
    })
    .await
    .map_err(|e| api_error(EngineError::internal(format!("search task failed: {e}"))))?
    .map_err(api_error)?;

    Ok(Json(SearchResponse {
        query: params.q,
        method,
        generation: results.generation,
        total_hits: results.total_hits,
        took_s: start.elapsed().as_secs_f64(),
        results: results.hits,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = state.engine.get_document(&doc_id).map_err(api_error)?;
    Ok(Json(DocumentResponse { id: doc.id.clone(), title: doc.title.clone(), body: doc.body.clone() }))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

// --- Admin endpoints ---
async fn index_commit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FlushOutcome>, ApiError> {
    authorize(&state, &headers)?;
    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || engine.flush())
        .await
        .map_err(|e| api_error(EngineError::internal(format!("commit task failed: {e}"))))?
        .map_err(api_error)?;
    Ok(Json(outcome))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

fn api_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
        EngineError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Internal(_) => {
            tracing::error!(error = %err, "request failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into());
        }
    };
    (status, err.to_string())
}
