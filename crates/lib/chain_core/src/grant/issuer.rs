//! Access-token minting.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::{GrantError, generate_token_value};
use crate::auth::jwt::sign_claims;
use crate::claims::{ClaimContext, ClaimMerger};
use crate::models::{AuthorizationRecord, IssuedValue};

/// Access token lifetime: 15 minutes.
const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 30 days.
const REFRESH_TOKEN_EXPIRY_SECS: i64 = 30 * 24 * 60 * 60;

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Signs outer JWTs for an authorization record.
pub struct TokenIssuer {
    issuer: String,
    secret: Vec<u8>,
    merger: ClaimMerger,
}

impl TokenIssuer {
    pub fn new(issuer: impl Into<String>, secret: impl Into<Vec<u8>>, merger: ClaimMerger) -> Self {
        Self {
            issuer: issuer.into(),
            secret: secret.into(),
            merger,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mint a new access token on `record`.
    ///
    /// An active refresh token is kept; otherwise a new one is generated.
    pub fn issue(&self, record: &mut AuthorizationRecord) -> Result<TokenResponse, GrantError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS);
        let scope = record.scopes.join(" ");

        let mut claims = Map::new();
        claims.insert("iss".into(), Value::String(self.issuer.clone()));
        claims.insert("aud".into(), Value::String(record.client_id.clone()));
        claims.insert("sub".into(), Value::String(record.principal_name.clone()));
        claims.insert("iat".into(), Value::from(now.timestamp()));
        claims.insert("nbf".into(), Value::from(now.timestamp()));
        claims.insert("exp".into(), Value::from(exp.timestamp()));
        claims.insert(
            "jti".into(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
        claims.insert("scope".into(), Value::String(scope.clone()));

        self.merger.merge(
            &ClaimContext {
                primary: record.primary.as_ref(),
                active: &record.active,
                relayed_access_token: record.relayed_access_token(),
            },
            &mut claims,
        );

        let token = sign_claims(&claims, &self.secret)
            .map_err(|e| GrantError::ServerError(e.to_string()))?;
        record.access_token = Some(IssuedValue::new(token.clone(), now, exp));

        let refresh_active = record
            .refresh_token
            .as_ref()
            .is_some_and(|t| t.is_active(now));
        if !refresh_active {
            record.refresh_token = Some(IssuedValue::new(
                generate_token_value(),
                now,
                now + Duration::seconds(REFRESH_TOKEN_EXPIRY_SECS),
            ));
        }

        let sub = claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!(
            authorization_id = %record.id,
            client_id = %record.client_id,
            sub,
            "issued access token"
        );

        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".into(),
            expires_in: ACCESS_TOKEN_EXPIRY_SECS,
            refresh_token: record.refresh_token.as_ref().map(|t| t.value.clone()),
            scope,
        })
    }
}
