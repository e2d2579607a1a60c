//! Inbound HTTP API.
//!
//! - `PUT /{*path}`: upload an object; answers `201 Created` with the
//!   upload receipt once every assigned node holds it.
//! - `GET /_stats`: shard upload counters and charged capacity.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use stow_cluster::{Coordinator, LocalCoordinator};
use stow_engine::{Shard, UploadReceipt, UploadRequest};
use stow_types::{ShardId, StatsSnapshot};

use crate::error::ApiError;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The shard uploads are ingested into.
    pub shard: Arc<Shard>,
    /// Coordinator backing the shard, for usage reporting.
    pub coordinator: Arc<LocalCoordinator>,
}

/// Response of `GET /_stats`.
#[derive(Debug, Serialize)]
struct StatsResponse {
    shard: ShardId,
    #[serde(flatten)]
    uploads: StatsSnapshot,
    charged_bytes: u64,
}

/// Build the inbound router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_stats", get(stats))
        .route("/{*path}", put(put_object))
        // Bodies are streamed to the spool, never held in memory.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

async fn put_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<UploadReceipt>), ApiError> {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(ApiError::MissingLength)?;

    // `path` is percent-decoded; the transport encodes it again per segment.
    let receipt = state
        .shard
        .accept_write(UploadRequest {
            path: format!("/{path}"),
            size,
            body: body.into_data_stream(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let shard = state.shard.id();
    Json(StatsResponse {
        shard,
        uploads: state.coordinator.stats().snapshot(),
        charged_bytes: state.coordinator.shard_usage(shard).await,
    })
}
