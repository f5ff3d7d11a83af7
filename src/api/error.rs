use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::DispatchError;

/// API error types that can be returned from handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Scheduling conflict: {0}")]
    SchedulingConflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::SchedulingConflict(_) | ApiError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            ApiError::TelemetryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::SchedulingConflict(_) => "SchedulingConflict",
            ApiError::InvalidTransition(_) => "InvalidTransition",
            ApiError::TelemetryUnavailable(_) => "TelemetryUnavailable",
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::InternalError(_) => {
                tracing::error!(error = %self, "API error occurred");
                "An internal error occurred".to_string()
            }
            ApiError::TelemetryUnavailable(_) => {
                tracing::warn!(error = %self, "dependency unavailable");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "client error");
                self.to_string()
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Validation(msg) => ApiError::ValidationError(msg),
            DispatchError::SchedulingConflict { .. } => {
                ApiError::SchedulingConflict(error.to_string())
            }
            DispatchError::InvalidTransition { .. } | DispatchError::NotActive { .. } => {
                ApiError::InvalidTransition(error.to_string())
            }
            DispatchError::NotFound { id } => ApiError::NotFound(format!("schedule {id}")),
            DispatchError::TelemetryUnavailable(msg) => ApiError::TelemetryUnavailable(msg),
            DispatchError::Internal(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}
