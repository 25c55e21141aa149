//! Admin HTTP API and startup helpers for the tandem sync agent.

pub mod catalog;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tandem_sync::{
    ConnectionStatus, ManualResolution, SyncConfig, SyncError, SyncOrchestrator, SyncResult,
};
use tandem_types::{ConflictStrategy, ConnectionMode, SyncLog, SyncMetadata};
use tokio_util::sync::CancellationToken;

const DEFAULT_LOG_LIMIT: usize = 20;
const MAX_LOG_LIMIT: usize = 500;

/// Shared state behind the admin API.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Cancels runs started through the API when the agent shuts down.
    pub cancel: CancellationToken,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub connection: ConnectionStatus,
    pub running: bool,
    pub record_types: Vec<String>,
    pub pending_conflicts: usize,
    pub last_result: Option<SyncResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize, Debug)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResolveRequest {
    pub strategy: ConflictStrategy,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModeRequest {
    pub mode: ConnectionMode,
}

/// A [`SyncError`] rendered as an HTTP response.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::AlreadyRunning => StatusCode::CONFLICT,
            SyncError::Offline(_) => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::NotFound(_) | SyncError::UnknownType(_) => StatusCode::NOT_FOUND,
            SyncError::Unresolved(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let journal = state.orchestrator.journal().clone();
    let pending = tokio::task::spawn_blocking(move || journal.pending_conflicts())
        .await
        .map_err(SyncError::from)?
        .map_err(SyncError::from)?;

    Ok(Json(StatusResponse {
        connection: state.orchestrator.connectivity().status().await,
        running: state.orchestrator.is_running(),
        record_types: state
            .orchestrator
            .registry()
            .type_names()
            .into_iter()
            .map(String::from)
            .collect(),
        pending_conflicts: pending.len(),
        last_result: state.orchestrator.last_result().await,
    }))
}

/// Offline runs still return their report, with 503.
fn run_response(result: std::result::Result<SyncResult, SyncError>) -> Response {
    match result {
        Ok(result) if result.offline => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(result)).into_response()
        }
        Ok(result) => Json(result).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn sync_all_handler(State(state): State<AppState>) -> Response {
    run_response(state.orchestrator.sync_all(&state.cancel).await)
}

async fn sync_incremental_handler(State(state): State<AppState>) -> Response {
    run_response(state.orchestrator.sync_incremental(&state.cancel).await)
}

async fn logs_handler(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Vec<SyncLog>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    let journal = state.orchestrator.journal().clone();
    let logs = tokio::task::spawn_blocking(move || journal.recent_logs(limit))
        .await
        .map_err(SyncError::from)?
        .map_err(SyncError::from)?;
    Ok(Json(logs))
}

async fn conflicts_handler(State(state): State<AppState>) -> ApiResult<Vec<SyncMetadata>> {
    let journal = state.orchestrator.journal().clone();
    let conflicts = tokio::task::spawn_blocking(move || journal.pending_conflicts())
        .await
        .map_err(SyncError::from)?
        .map_err(SyncError::from)?;
    Ok(Json(conflicts))
}

async fn resolve_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<ManualResolution> {
    let resolution = state
        .orchestrator
        .resolve_conflict(id, request.strategy)
        .await?;
    Ok(Json(resolution))
}

async fn mode_handler(
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> Json<ConnectionStatus> {
    Json(state.orchestrator.connectivity().set_mode(request.mode).await)
}

/// Build the admin API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/sync", post(sync_all_handler))
        .route("/api/v1/sync/incremental", post(sync_incremental_handler))
        .route("/api/v1/logs", get(logs_handler))
        .route("/api/v1/conflicts", get(conflicts_handler))
        .route("/api/v1/conflicts/{id}/resolve", post(resolve_handler))
        .route("/api/v1/mode", put(mode_handler))
        .with_state(state)
}

/// Reads a TOML configuration file. Missing keys take their defaults.
pub fn load_config(path: &FsPath) -> Result<SyncConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SyncConfig = toml::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
