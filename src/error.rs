// Error taxonomy for the stats service
// Startup errors are fatal, everything else is recovered where it happens

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatsError>;

#[derive(Debug, Error)]
pub enum StatsError {
    /// Recognized-vehicle list is absent (fatal at startup)
    #[error("vehicle catalog not found at {}", .path.display())]
    CatalogMissing { path: PathBuf },

    /// Recognized-vehicle list exists but cannot be used (fatal at startup)
    #[error("vehicle catalog at {} is invalid: {reason}", .path.display())]
    CatalogInvalid { path: PathBuf, reason: String },

    #[error("failed to read stats from {}: {source}", .path.display())]
    PersistenceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write stats to {}: {source}", .path.display())]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stats file {} is corrupt: {source}", .path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize stats: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Non-positive or non-finite usage duration
    #[error("invalid usage duration: {0}")]
    InvalidDuration(f64),

    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: String, action: &'static str },

    /// The hub task has stopped and can no longer take commands
    #[error("stats service is not running")]
    ServiceClosed,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for StatsError {
    fn into_response(self) -> Response {
        let status = match self {
            StatsError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            StatsError::ServiceClosed => StatusCode::SERVICE_UNAVAILABLE,
            StatsError::InvalidDuration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
