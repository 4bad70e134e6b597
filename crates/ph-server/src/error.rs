//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`ph_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on core operations.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError(ph_core::Error);

impl From<ph_core::Error> for AppError {
    fn from(e: ph_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in API handler");
        }

        let code = match &self.0 {
            ph_core::Error::NotFound { .. } => "not_found",
            ph_core::Error::Forbidden(_) => "forbidden",
            ph_core::Error::Validation(_) => "validation_error",
            ph_core::Error::Planning(_) => "planning_error",
            ph_core::Error::SessionNotLive(_) => "session_not_live",
            ph_core::Error::Gone(_) => "gone",
            ph_core::Error::Tool { .. } => "tool_error",
            ph_core::Error::Probe(_) => "probe_error",
            ph_core::Error::Io { .. } => "io_error",
            ph_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
