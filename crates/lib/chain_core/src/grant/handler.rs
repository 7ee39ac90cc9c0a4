//! Base grant handler: issues codes and validates refresh tokens.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::{
    GrantContext, GrantError, GrantHandler, GrantRequest, GrantResult, GrantType,
    generate_token_value,
};
use crate::authorization::AuthorizationStore;
use crate::models::{AuthorizationRecord, IssuedValue, TokenType};

/// Authorization code lifetime: 5 minutes.
const AUTHORIZATION_CODE_TTL_SECS: i64 = 5 * 60;

/// Persists authorization records for the code and refresh grants.
pub struct StandardGrantHandler {
    store: Arc<dyn AuthorizationStore>,
}

impl StandardGrantHandler {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GrantHandler for StandardGrantHandler {
    async fn handle(
        &self,
        request: &GrantRequest,
        ctx: &GrantContext,
    ) -> Result<GrantResult, GrantError> {
        match request {
            GrantRequest::AuthorizationCode(req) => {
                let Some(active) = ctx.authentication.clone() else {
                    return Err(GrantError::AccessDenied("no authenticated user".into()));
                };
                let now = Utc::now();
                let code = generate_token_value();
                let record = AuthorizationRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    client_id: req.client_id.clone(),
                    principal_name: active.principal_name().to_string(),
                    redirect_uri: req.redirect_uri.clone(),
                    scopes: req.scopes.clone(),
                    code_challenge: req.code_challenge.clone(),
                    authorization_code: Some(IssuedValue::new(
                        code.clone(),
                        now,
                        now + Duration::seconds(AUTHORIZATION_CODE_TTL_SECS),
                    )),
                    access_token: None,
                    refresh_token: None,
                    primary: ctx.primary.clone(),
                    active,
                    attributes: BTreeMap::new(),
                };
                let result = GrantResult {
                    grant_type: GrantType::AuthorizationCode,
                    authorization_id: record.id.clone(),
                    token_value: code,
                    token_type: TokenType::Code,
                    principal_name: record.principal_name.clone(),
                };
                self.store
                    .save(record)
                    .await
                    .map_err(|e| GrantError::ServerError(e.to_string()))?;
                debug!(
                    authorization_id = %result.authorization_id,
                    client_id = %req.client_id,
                    "issued authorization code"
                );
                Ok(result)
            }
            GrantRequest::RefreshToken(req) => {
                let record = self
                    .store
                    .find_by_token(&req.refresh_token, Some(TokenType::RefreshToken))
                    .await
                    .map_err(|e| GrantError::ServerError(e.to_string()))?
                    .ok_or_else(|| GrantError::InvalidGrant("unknown refresh token".into()))?;
                if record.client_id != req.client_id {
                    warn!(client_id = %req.client_id, "refresh token presented by another client");
                    return Err(GrantError::InvalidGrant(
                        "refresh token was issued to another client".into(),
                    ));
                }
                let active = record
                    .refresh_token
                    .as_ref()
                    .is_some_and(|t| t.is_active(Utc::now()));
                if !active {
                    return Err(GrantError::InvalidGrant("refresh token expired".into()));
                }
                Ok(GrantResult {
                    grant_type: GrantType::RefreshToken,
                    authorization_id: record.id.clone(),
                    token_value: req.refresh_token.clone(),
                    token_type: TokenType::RefreshToken,
                    principal_name: record.principal_name,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::InMemoryAuthorizationStore;
    use crate::grant::{AuthorizationCodeRequest, RefreshTokenRequest};
    use crate::models::{AuthenticationResult, IdentityRecord};

    fn github() -> IdentityRecord {
        IdentityRecord {
            registration_id: "github".into(),
            subject: None,
            preferred_username: None,
            name: None,
            principal_name: "42".into(),
            authorities: vec![],
            raw_attributes: Default::default(),
        }
    }

    fn code_request() -> GrantRequest {
        GrantRequest::AuthorizationCode(AuthorizationCodeRequest {
            client_id: "test-app".into(),
            redirect_uri: "http://127.0.0.1:8080/cb".into(),
            scopes: vec!["openid".into()],
            state: Some("xyz".into()),
            code_challenge: None,
            code_challenge_method: None,
        })
    }

    #[tokio::test]
    async fn code_grant_snapshots_identities() {
        let store = Arc::new(InMemoryAuthorizationStore::new());
        let handler = StandardGrantHandler::new(store.clone());
        let ctx = GrantContext {
            authentication: Some(AuthenticationResult::Secondary(github())),
            primary: None,
        };

        let result = handler.handle(&code_request(), &ctx).await.unwrap();
        assert_eq!(result.token_type, TokenType::Code);
        assert_eq!(result.principal_name, "42");

        let record = store
            .find_by_token(&result.token_value, Some(TokenType::Code))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.active, AuthenticationResult::Secondary(github()));
    }

    #[tokio::test]
    async fn code_grant_requires_authentication() {
        let store = Arc::new(InMemoryAuthorizationStore::new());
        let handler = StandardGrantHandler::new(store);
        let err = handler
            .handle(&code_request(), &GrantContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_invalid_grant() {
        let store = Arc::new(InMemoryAuthorizationStore::new());
        let handler = StandardGrantHandler::new(store);
        let err = handler
            .handle(
                &GrantRequest::RefreshToken(RefreshTokenRequest {
                    client_id: "test-app".into(),
                    refresh_token: "nope".into(),
                }),
                &GrantContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidGrant(_)));
    }
}
