//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/repositories` | List repository records |
//! | `POST` | `/api/repositories` | Register a repository from `{ "repoUrl": ... }` |
//! | `GET`  | `/api/repositories/{owner}/{repo}` | One repository record |
//! | `POST` | `/api/repositories/{owner}/{repo}/sync` | Run a sync |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "sync already in progress for acme/widget" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `unauthorized` | 401 |
//! | `not_found` | 404 |
//! | `conflict` | 409 |
//! | `upstream_fetch`, `store_corrupt`, `embedding_service`, `persist`, `storage`, `internal` | 500 |

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use repo_index_core::models::RepositoryRecord;
use repo_index_core::store::MetadataStore;
use repo_index_core::sync::now_millis;
use repo_index_core::{RepoKey, SyncEngine, SyncError, SyncOutcome};

use crate::config::Config;
use crate::github_url::parse_repo_url;
use crate::service::build_engine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<SyncEngine>,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }
}

/// Build the router. `cors_origin = None` allows any origin.
pub fn router(state: AppState, cors_origin: Option<&str>) -> anyhow::Result<Router> {
    let origin = match cors_origin {
        Some(origin) => AllowOrigin::exact(
            origin
                .parse::<HeaderValue>()
                .map_err(|e| anyhow::anyhow!("invalid server.cors_origin '{}': {}", origin, e))?,
        ),
        None => AllowOrigin::from(Any),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/repositories",
            get(handle_list).post(handle_create),
        )
        .route("/api/repositories/{owner}/{repo}", get(handle_get))
        .route("/api/repositories/{owner}/{repo}/sync", post(handle_sync))
        .layer(cors)
        .with_state(state))
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(config).await?);
    let app = router(AppState::new(engine), config.server.cors_origin.as_deref())?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "HTTP server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!("request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict(_) => StatusCode::CONFLICT,
            SyncError::Authorization(_) => StatusCode::UNAUTHORIZED,
            SyncError::UpstreamFetch(_)
            | SyncError::StoreCorrupt(_)
            | SyncError::EmbeddingService(_)
            | SyncError::Persist(_)
            | SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /api/repositories ============

#[derive(Serialize)]
struct RepositoryListResponse {
    repositories: Vec<RepositoryRecord>,
}

async fn handle_list(
    State(state): State<AppState>,
) -> Result<Json<RepositoryListResponse>, AppError> {
    let repositories = state.engine.metadata().list().await.map_err(internal)?;
    Ok(Json(RepositoryListResponse { repositories }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRepositoryRequest {
    repo_url: String,
}

/// `201` with a new `pending` record, or `200` with the existing one.
async fn handle_create(
    State(state): State<AppState>,
    payload: Result<Json<CreateRepositoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RepositoryRecord>), AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let key = parse_repo_url(&request.repo_url).map_err(|e| bad_request(e.to_string()))?;

    let (record, created) = state
        .engine
        .metadata()
        .create_if_absent(&key, now_millis())
        .await
        .map_err(internal)?;
    if created {
        info!(repo = %key, "repository registered");
    }
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record)))
}

async fn handle_get(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<RepositoryRecord>, AppError> {
    let key = RepoKey::new(owner, repo);
    state
        .engine
        .metadata()
        .get(&key)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("repository not found: {}", key)))
}

async fn handle_sync(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<SyncOutcome>, AppError> {
    let key = RepoKey::new(owner, repo);
    let outcome = state.engine.sync(&key).await?;
    Ok(Json(outcome))
}
