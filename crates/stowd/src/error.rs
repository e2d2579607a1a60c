//! HTTP error responses of the inbound API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stow_cluster::ClusterError;
use stow_engine::IngestError;

/// Errors returned by the inbound handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The upload did not declare its length.
    #[error("missing or invalid Content-Length")]
    MissingLength,

    /// The ingest pipeline failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl ApiError {
    /// Map to an HTTP status code.
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingLength => StatusCode::LENGTH_REQUIRED,
            Self::Ingest(e) => match e {
                IngestError::InvalidPath { .. }
                | IngestError::LengthMismatch { .. }
                | IngestError::Ingress { .. } => StatusCode::BAD_REQUEST,
                IngestError::Accounting {
                    source:
                        ClusterError::CapacityExceeded { .. } | ClusterError::UsageOverflow { .. },
                    ..
                } => StatusCode::INSUFFICIENT_STORAGE,
                IngestError::NoNodeAccepted { .. }
                | IngestError::Replication { .. }
                | IngestError::ReplicationAborted { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
