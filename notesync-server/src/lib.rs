/// NoteSync reference server
///
/// Serves the push, pull and delete-one sync routes over JSON/HTTP on top of
/// a partitioned `RemoteRepository`, plus /health and /metrics.

pub mod metrics;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use notesync_sync::protocol::{PullQuery, DELETE_PATH, PULL_PATH, PUSH_PATH};
use notesync_sync::{
    DeleteRequest, DeleteResponse, PullResponse, PushRequest, PushResponse, RemoteRepository,
    SyncError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone, Default)]
pub struct AppState {
    repository: Arc<RemoteRepository>,
}

impl AppState {
    pub fn new(repository: Arc<RemoteRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<RemoteRepository> {
        &self.repository
    }
}

/// Error body returned for rejected requests
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub error: String,
}

/// Handler error mapped onto an HTTP status
#[derive(Debug)]
pub struct ApiError(SyncError);

impl ApiError {
    fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

fn status_for(error: &SyncError) -> StatusCode {
    match error {
        SyncError::MissingInstanceId => StatusCode::BAD_REQUEST,
        SyncError::Store(e) if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        metrics::ERRORS_TOTAL.with_label_values(&[self.0.code()]).inc();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            tracing::warn!(code = self.0.code(), error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            code: self.0.code(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router with sync, health and metrics routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PUSH_PATH, post(push_handler))
        .route(PULL_PATH, get(pull_handler))
        .route(DELETE_PATH, post(delete_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn record<T>(route: &str, started: Instant, result: &Result<T, SyncError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) if status_for(e).is_client_error() => "client_error",
        Err(_) => "server_error",
    };
    metrics::SYNC_REQUESTS_TOTAL
        .with_label_values(&[route, status])
        .inc();
    metrics::SYNC_DURATION_SECONDS
        .with_label_values(&[route])
        .observe(started.elapsed().as_secs_f64());
}

async fn push_handler(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, ApiError> {
    let started = Instant::now();
    let instance_id = request.instance_id.clone();
    let notes_in = request.notes.len();
    let tombstones_in = request.tombstone_ids.len();
    for rejected in &request.rejected {
        tracing::warn!(
            instance_id = %instance_id,
            note_id = rejected.id.as_deref().unwrap_or("<none>"),
            error = %rejected.error,
            "skipping malformed pushed note"
        );
    }
    metrics::RECORDS_TOTAL
        .with_label_values(&["push", "invalid"])
        .inc_by(request.rejected.len() as u64);

    let result = state.repository.push(request);
    record("push", started, &result);
    let response = result?;

    metrics::RECORDS_TOTAL
        .with_label_values(&["push", "note"])
        .inc_by(response.accepted_notes.len() as u64);
    metrics::RECORDS_TOTAL
        .with_label_values(&["push", "tombstone"])
        .inc_by(tombstones_in as u64);
    tracing::info!(
        instance_id = %instance_id,
        notes = notes_in,
        accepted = response.accepted_notes.len(),
        tombstones = tombstones_in,
        "push"
    );

    Ok(Json(response))
}

async fn pull_handler(
    State(state): State<AppState>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>, ApiError> {
    let started = Instant::now();
    let result = state.repository.pull(&query.instance_id);
    record("pull", started, &result);
    let response = result?;

    metrics::RECORDS_TOTAL
        .with_label_values(&["pull", "note"])
        .inc_by(response.notes.len() as u64);
    metrics::RECORDS_TOTAL
        .with_label_values(&["pull", "tombstone"])
        .inc_by(response.tombstone_ids.len() as u64);
    tracing::debug!(
        instance_id = %query.instance_id,
        notes = response.notes.len(),
        tombstones = response.tombstone_ids.len(),
        "pull"
    );

    Ok(Json(response))
}

async fn delete_handler(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let started = Instant::now();
    let instance_id = request.instance_id.clone();
    let note_id = request.note_id.clone();

    let result = state.repository.delete_one(request);
    record("delete", started, &result);
    let response = result?;

    if response.processed {
        metrics::RECORDS_TOTAL
            .with_label_values(&["delete", "tombstone"])
            .inc();
    }
    tracing::info!(
        instance_id = %instance_id,
        note_id = %note_id,
        processed = response.processed,
        "delete"
    );

    Ok(Json(response))
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler() -> String {
    metrics::encode_metrics().unwrap_or_else(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        String::from("# Error encoding metrics\n")
    })
}
