//! Error handling for the admin API

use aide::OperationOutput;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hmpps_sqs::QueueError;
use schemars::JsonSchema;
use serde::Serialize;

/// API error response envelope
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Whether the client should retry the request
    pub allow_retry: bool,
    /// Error details
    error: ErrorBody,
}

/// Error body containing code and message
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    /// Machine-readable error code
    pub code: &'static str,
    /// Human-readable error message
    pub message: &'static str,
}

/// Application error type that wraps the API error response
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    inner: ApiErrorResponse,
}

impl AppError {
    /// Create a new application error
    #[must_use]
    pub const fn new(
        status: StatusCode,
        code: &'static str,
        msg: &'static str,
        retry: bool,
    ) -> Self {
        Self {
            status,
            inner: ApiErrorResponse {
                allow_retry: retry,
                error: ErrorBody { code, message: msg },
            },
        }
    }

    #[must_use]
    pub const fn not_found(msg: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg, false)
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.status.as_u16() {
            400..=499 => tracing::warn!(
                "Client error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            500..=599 => tracing::error!(
                "Server error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            _ => {}
        }

        (self.status, Json(self.inner)).into_response()
    }
}

/// Convert queue provider errors to application errors
impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        if err.is_upstream_error() {
            tracing::error!("Queue provider upstream error: {err}");
            return Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_error",
                "Queue provider temporarily unavailable",
                true,
            );
        }

        tracing::error!("Queue provider error: {err}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
            true,
        )
    }
}

impl OperationOutput for AppError {
    type Inner = ApiErrorResponse;

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Option<aide::openapi::Response> {
        Json::<ApiErrorResponse>::operation_response(ctx, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_status() {
        let upstream = QueueError::Provider {
            operation: "ReceiveMessage",
            message: "boom".to_string(),
            upstream: true,
        };
        assert_eq!(AppError::from(upstream).status(), StatusCode::SERVICE_UNAVAILABLE);

        let client = QueueError::Provider {
            operation: "ReceiveMessage",
            message: "denied".to_string(),
            upstream: false,
        };
        assert_eq!(AppError::from(client).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
