//! Authorization records kept by the authorization server.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{AuthenticationResult, IdentityRecord};

/// Attribute under which the relayed secondary access token is stored.
pub const ACCESS_TOKEN_ATTRIBUTE: &str = "access_token";

/// Kind of value a record can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Code,
    AccessToken,
    RefreshToken,
}

/// A code or token issued against an authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedValue {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once a code has been redeemed.
    pub invalidated: bool,
}

impl IssuedValue {
    pub fn new(value: String, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            issued_at,
            expires_at,
            invalidated: false,
        }
    }

    /// Usable: not invalidated and not expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.invalidated && self.expires_at > now
    }
}

/// One authorization granted to a client on behalf of a principal.
///
/// The identities active when the code was issued are snapshotted here so that
/// token issuance never has to reach back into the browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: String,
    pub client_id: String,
    /// Name of the principal that authorized the client.
    pub principal_name: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub code_challenge: Option<String>,
    pub authorization_code: Option<IssuedValue>,
    pub access_token: Option<IssuedValue>,
    pub refresh_token: Option<IssuedValue>,
    /// Primary identity taken from the chain session, when one existed.
    pub primary: Option<IdentityRecord>,
    /// Authentication active when the code was issued.
    pub active: AuthenticationResult,
    pub attributes: BTreeMap<String, String>,
}

impl AuthorizationRecord {
    pub fn token(&self, token_type: TokenType) -> Option<&IssuedValue> {
        match token_type {
            TokenType::Code => self.authorization_code.as_ref(),
            TokenType::AccessToken => self.access_token.as_ref(),
            TokenType::RefreshToken => self.refresh_token.as_ref(),
        }
    }

    /// Lookup keys currently pointing at this record. Redeemed codes are excluded.
    pub fn index_keys(&self) -> Vec<(String, TokenType)> {
        [TokenType::Code, TokenType::AccessToken, TokenType::RefreshToken]
            .into_iter()
            .filter_map(|ty| {
                self.token(ty)
                    .filter(|t| !(ty == TokenType::Code && t.invalidated))
                    .map(|t| (t.value.clone(), ty))
            })
            .collect()
    }

    /// Relayed secondary access token, if one has been persisted.
    pub fn relayed_access_token(&self) -> Option<&str> {
        self.attributes
            .get(ACCESS_TOKEN_ATTRIBUTE)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether every issued value has expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        [TokenType::Code, TokenType::AccessToken, TokenType::RefreshToken]
            .into_iter()
            .filter_map(|ty| self.token(ty))
            .all(|t| t.expires_at <= now)
    }
}
