//! Outer-JWT → embedded access-token substitution.

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use chain_core::auth::jwt::decode_unverified;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::auth_required::bearer_token;
use super::{GatewayFilter, Next};

/// Claim carrying the downstream access token.
const ACCESS_TOKEN_CLAIM: &str = "access_token";

/// Replaces the bearer JWT with its `access_token` claim.
///
/// Anything that cannot be substituted is forwarded unchanged.
pub struct BearerSubstitutionFilter;

/// Downstream token embedded in a bearer JWT, if any.
fn embedded_access_token(token: &str) -> Option<String> {
    let claims = match decode_unverified(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "failed to parse bearer JWT; forwarding original token");
            return None;
        }
    };
    let subject = claims.get("sub").and_then(Value::as_str).unwrap_or_default();
    info!(sub = subject, "processing bearer JWT");

    match claims.get(ACCESS_TOKEN_CLAIM).and_then(Value::as_str) {
        Some(access) if !access.is_empty() => Some(access.to_string()),
        _ => {
            warn!(sub = subject, "no access_token claim; forwarding original token");
            None
        }
    }
}

#[async_trait]
impl GatewayFilter for BearerSubstitutionFilter {
    fn name(&self) -> &'static str {
        "bearer-substitution"
    }

    async fn filter(&self, mut request: Request, next: Next<'_>) -> Response {
        let replacement = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .and_then(embedded_access_token);

        match replacement.map(|t| HeaderValue::from_str(&format!("Bearer {t}"))) {
            Some(Ok(value)) => {
                debug!("replacing bearer token with embedded access token");
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Some(Err(e)) => warn!(error = %e, "embedded access token is not a valid header value"),
            None => debug!("authorization header forwarded unchanged"),
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::auth::jwt::sign_claims;
    use serde_json::json;

    fn jwt(claims: Value) -> String {
        sign_claims(claims.as_object().unwrap(), b"any-secret").unwrap()
    }

    #[test]
    fn extracts_non_empty_access_token() {
        assert_eq!(
            embedded_access_token(&jwt(json!({"sub": "u", "access_token": "tok-123"}))).as_deref(),
            Some("tok-123")
        );
        assert!(embedded_access_token(&jwt(json!({"sub": "u", "access_token": ""}))).is_none());
        assert!(embedded_access_token(&jwt(json!({"sub": "u"}))).is_none());
    }

    #[test]
    fn unparseable_token_is_ignored() {
        assert!(embedded_access_token("opaque-token").is_none());
    }
}
