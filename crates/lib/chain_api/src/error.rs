//! Application error types.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chain_core::grant::GrantError;
use chain_core::oauth::OAuthError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error("Identity provider error: {0}")]
    Provider(#[from] OAuthError),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, description) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "invalid_request", m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
            AppError::Grant(e) => {
                let status = match e {
                    GrantError::InvalidClient(_) => StatusCode::UNAUTHORIZED,
                    GrantError::AccessDenied(_) => StatusCode::FORBIDDEN,
                    GrantError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.code(), e.description().to_string())
            }
            AppError::Provider(e) => {
                error!(error = %e, "identity provider call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "temporarily_unavailable",
                    "Identity provider request failed".to_string(),
                )
            }
            AppError::Internal(m) => {
                error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "Internal server error".to_string(),
                )
            }
        };
        let body = Json(json!({
            "error": code,
            "error_description": description,
        }));
        let mut resp = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"oauth2\""),
            );
        }
        resp
    }
}
