//! Gateway error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Errors raised while proxying downstream.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid downstream URL: {0}")]
    InvalidDownstream(String),

    #[error("Downstream unreachable: {0}")]
    Unreachable(String),

    #[error("Downstream timed out: {0}")]
    Timeout(String),

    #[error("Request body rejected: {0}")]
    Body(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            GatewayError::Unreachable(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            GatewayError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "gateway_timeout"),
            GatewayError::Body(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            GatewayError::InvalidDownstream(_) | GatewayError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        warn!(error = %self, status = status.as_u16(), "gateway error");
        let body = Json(json!({
            "error": error,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
