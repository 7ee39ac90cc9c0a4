//! JWT encoding, verification and unverified decoding.

use std::path::PathBuf;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde_json::{Map, Value};
use tracing::info;

use super::AuthError;

/// Claim set of an outer token.
pub type Claims = Map<String, Value>;

/// Sign a claim set (HS256).
pub fn sign_claims(claims: &Claims, secret: &[u8]) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// Verify an HS256 signature and return the claims.
///
/// Expiry is not checked here; callers apply their own `exp` policy.
pub fn verify_signature(token: &str, secret: &[u8]) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::TokenError(format!("jwt verify: {e}")))
}

/// Decode the claims of a JWT without checking its signature.
pub fn decode_unverified(token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::Malformed(e.to_string()))
}

/// The `exp` claim as seconds since the epoch, when present and numeric.
pub fn expiry(claims: &Claims) -> Option<i64> {
    match claims.get("exp")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chain-auth")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret-at-least-32-bytes-long!!";

    fn claims(v: Value) -> Claims {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn signed_token_verifies_with_same_secret() {
        let token = sign_claims(&claims(json!({"sub": "user-1", "exp": 1})), SECRET).unwrap();
        let decoded = verify_signature(&token, SECRET).unwrap();
        assert_eq!(decoded["sub"], "user-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_claims(&claims(json!({"sub": "user-1"})), SECRET).unwrap();
        assert!(verify_signature(&token, b"another-secret-entirely-32-bytes!!").is_err());
    }

    #[test]
    fn unverified_decode_ignores_signature_and_expiry() {
        let token =
            sign_claims(&claims(json!({"access_token": "tok-123", "exp": 10})), b"whatever").unwrap();
        let decoded = decode_unverified(&token).unwrap();
        assert_eq!(decoded["access_token"], "tok-123");
        assert_eq!(expiry(&decoded), Some(10));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_unverified("not-a-jwt"),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn missing_or_non_numeric_exp_has_no_expiry() {
        assert_eq!(expiry(&claims(json!({}))), None);
        assert_eq!(expiry(&claims(json!({"exp": "soon"}))), None);
    }
}
