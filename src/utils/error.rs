use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::db::RepositoryError;
use crate::utils::response::{error as error_response, FieldErrors};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        details: FieldErrors,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A repository failure. `message` is the only text the client sees.
    #[error("{message}")]
    Storage {
        message: &'static str,
        #[source]
        source: RepositoryError,
    },
}

impl AppError {
    pub fn validation(message: impl Into<String>, details: FieldErrors) -> Self {
        AppError::ValidationError {
            message: message.into(),
            details,
        }
    }

    /// Single-field semantic failure, reported in the same shape as structural ones.
    pub fn invalid_field(field: &str, reason: impl Into<String>, message: impl Into<String>) -> Self {
        let mut details = FieldErrors::new();
        details.insert(field.to_string(), reason.into());
        Self::validation(message, details)
    }

    pub fn storage(message: &'static str, source: RepositoryError) -> Self {
        match source {
            RepositoryError::NotFound => AppError::NotFound(message.to_string()),
            source => AppError::Storage { message, source },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Storage { .. } => "DATABASE_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError { message, details } => {
                warn!(code = self.code(), message = %message, fields = ?details, "Request rejected");
            }
            AppError::BadRequest(msg) | AppError::AuthError(msg) | AppError::NotFound(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::Storage { message, source } => {
                error!(error = %source, message = %message, "Repository error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        let (public_message, details) = match self {
            AppError::ValidationError { message, details } => (message, Some(details)),
            AppError::BadRequest(msg) | AppError::AuthError(msg) | AppError::NotFound(msg) => {
                (msg, None)
            }
            AppError::Storage { message, .. } => (message.to_string(), None),
        };

        error_response(code, public_message, details, status)
    }
}
