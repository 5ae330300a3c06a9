use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Field name to human-readable reason, one entry per failing field.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<FieldErrors>,
}

pub fn success<T>(data: T) -> Response
where
    T: Serialize,
{
    (StatusCode::OK, Json(data)).into_response()
}

pub fn created<T>(data: T) -> Response
where
    T: Serialize,
{
    (StatusCode::CREATED, Json(data)).into_response()
}

pub fn empty_success() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<FieldErrors>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        error: code.to_string(),
        message: message.into(),
        details,
    };

    (status, Json(body)).into_response()
}
