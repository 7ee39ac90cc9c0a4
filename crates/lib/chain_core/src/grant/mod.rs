//! Grant handling for the adapter's own authorization server.
//!
//! Only the mechanics the chain needs: authorization codes with PKCE (S256),
//! code exchange and refresh. Handlers implement [`GrantHandler`] so the relay
//! interceptor can wrap the code and refresh grants.

pub mod client;
pub mod handler;
pub mod issuer;
pub mod server;

use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::models::{AuthenticationResult, IdentityRecord, TokenType};

pub use client::{ClientRegistry, RegisteredClient};
pub use handler::StandardGrantHandler;
pub use issuer::{TokenIssuer, TokenResponse};
pub use server::AuthorizationServer;

/// OAuth2 error raised while handling a grant.
#[derive(Debug, Clone, Error)]
pub enum GrantError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("access_denied: {0}")]
    AccessDenied(String),

    #[error("server_error: {0}")]
    ServerError(String),
}

impl GrantError {
    /// RFC 6749 error code.
    pub fn code(&self) -> &'static str {
        match self {
            GrantError::InvalidRequest(_) => "invalid_request",
            GrantError::InvalidClient(_) => "invalid_client",
            GrantError::InvalidGrant(_) => "invalid_grant",
            GrantError::InvalidScope(_) => "invalid_scope",
            GrantError::UnsupportedGrantType(_) => "unsupported_grant_type",
            GrantError::AccessDenied(_) => "access_denied",
            GrantError::ServerError(_) => "server_error",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            GrantError::InvalidRequest(d)
            | GrantError::InvalidClient(d)
            | GrantError::InvalidGrant(d)
            | GrantError::InvalidScope(d)
            | GrantError::UnsupportedGrantType(d)
            | GrantError::AccessDenied(d)
            | GrantError::ServerError(d) => d,
        }
    }

    /// Error body as returned by the token endpoint.
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.code(),
            "error_description": self.description(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// Authorization request as received at the authorize endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCodeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRequest {
    pub client_id: String,
    pub refresh_token: String,
}

/// A grant to be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum GrantRequest {
    AuthorizationCode(AuthorizationCodeRequest),
    RefreshToken(RefreshTokenRequest),
}

impl GrantRequest {
    pub fn grant_type(&self) -> GrantType {
        match self {
            GrantRequest::AuthorizationCode(_) => GrantType::AuthorizationCode,
            GrantRequest::RefreshToken(_) => GrantType::RefreshToken,
        }
    }
}

/// Identities available to a grant, passed explicitly by the caller.
#[derive(Debug, Clone, Default)]
pub struct GrantContext {
    /// Authentication of the current request's user.
    pub authentication: Option<AuthenticationResult>,
    /// Primary identity from the chain session.
    pub primary: Option<IdentityRecord>,
}

/// Outcome of a successful grant.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantResult {
    pub grant_type: GrantType,
    pub authorization_id: String,
    /// Code or token value the record is stored under.
    pub token_value: String,
    pub token_type: TokenType,
    pub principal_name: String,
}

/// Handles one kind of grant and persists its authorization record.
#[async_trait]
pub trait GrantHandler: Send + Sync {
    async fn handle(
        &self,
        request: &GrantRequest,
        ctx: &GrantContext,
    ) -> Result<GrantResult, GrantError>;
}

/// Random URL-safe value for codes and opaque tokens.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_json_has_code_and_description() {
        let err = GrantError::InvalidGrant("code already used".into());
        assert_eq!(
            err.to_json(),
            json!({"error": "invalid_grant", "error_description": "code already used"})
        );
    }

    #[test]
    fn token_values_are_unique_and_url_safe() {
        let a = generate_token_value();
        assert_ne!(a, generate_token_value());
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }
}
