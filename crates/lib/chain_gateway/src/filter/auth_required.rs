//! Bearer presence and expiry enforcement with an RFC 9728 challenge.

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chain_core::auth::jwt::{decode_unverified, expiry, verify_signature};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{GatewayFilter, Next, RESOURCE_METADATA_PATH, request_origin};

/// Rejects requests without credentials, or with an expired bearer JWT.
///
/// Non-bearer schemes pass untouched.
pub struct AuthenticationRequiredFilter {
    default_scheme: String,
    jwt_secret: Option<String>,
}

impl AuthenticationRequiredFilter {
    pub fn new(default_scheme: impl Into<String>, jwt_secret: Option<String>) -> Self {
        Self {
            default_scheme: default_scheme.into(),
            jwt_secret,
        }
    }

    fn challenge(&self, request: &Request, invalid_token: bool) -> Response {
        let metadata_url = format!(
            "{}{RESOURCE_METADATA_PATH}",
            request_origin(request, &self.default_scheme)
        );
        let value = if invalid_token {
            format!("Bearer error=\"invalid_token\", resource_metadata=\"{metadata_url}\"")
        } else {
            format!("Bearer resource_metadata=\"{metadata_url}\"")
        };
        let mut resp = StatusCode::UNAUTHORIZED.into_response();
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                resp.headers_mut().insert(WWW_AUTHENTICATE, v);
            }
            Err(e) => warn!(error = %e, "challenge header is not a valid header value"),
        }
        resp
    }

    /// Whether a bearer token is acceptable: a JWT, correctly signed when a
    /// secret is configured, and not past its `exp`.
    fn bearer_is_valid(&self, token: &str) -> bool {
        let claims = match &self.jwt_secret {
            Some(secret) => verify_signature(token, secret.as_bytes()),
            None => decode_unverified(token),
        };
        let claims = match claims {
            Ok(claims) => claims,
            Err(e) => {
                info!(error = %e, "bearer token rejected");
                return false;
            }
        };
        match expiry(&claims) {
            Some(exp) if exp < Utc::now().timestamp() => {
                info!(exp, "bearer token is expired");
                false
            }
            _ => true,
        }
    }
}

/// Token of an `Authorization: Bearer ...` header value.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl GatewayFilter for AuthenticationRequiredFilter {
    fn name(&self) -> &'static str {
        "authentication-required"
    }

    async fn filter(&self, request: Request, next: Next<'_>) -> Response {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let Some(header) = header else {
            warn!(path = request.uri().path(), "rejected: no Authorization header");
            return self.challenge(&request, false);
        };

        let is_bearer = header
            .split_whitespace()
            .next()
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer"));
        if !is_bearer {
            debug!("non-bearer credentials pass through");
            return next.run(request).await;
        }

        match bearer_token(&header) {
            Some(token) if self.bearer_is_valid(token) => next.run(request).await,
            _ => self.challenge(&request, true),
        }
    }
}
