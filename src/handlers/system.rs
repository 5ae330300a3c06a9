use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;
use crate::utils::response::success;
use crate::version;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub build_info: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`: 200 while the database answers, 503 otherwise.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let (status, code, database) = match state.events.ping().await {
        Ok(()) => ("healthy", StatusCode::OK, "connected"),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    let payload = HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        database: database.to_string(),
    };

    (code, Json(payload)).into_response()
}

/// `GET /version`
pub async fn version_info() -> Response {
    success(VersionResponse {
        version: version::VERSION.to_string(),
        build_info: version::build_info(),
        timestamp: Utc::now(),
    })
}
