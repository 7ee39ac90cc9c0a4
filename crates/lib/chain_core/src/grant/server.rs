//! Authorization endpoint and token endpoint logic.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use url::Url;

use super::{
    AuthorizationCodeRequest, ClientRegistry, GrantContext, GrantError, GrantHandler,
    GrantRequest, RefreshTokenRequest, TokenIssuer, TokenResponse,
};
use crate::authorization::AuthorizationStore;
use crate::models::TokenType;
use crate::oauth::compute_code_challenge;

/// Parameters of an `authorization_code` token request.
#[derive(Debug, Clone)]
pub struct CodeExchange {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
}

/// The adapter's authorization server.
pub struct AuthorizationServer {
    store: Arc<dyn AuthorizationStore>,
    clients: ClientRegistry,
    handler: Arc<dyn GrantHandler>,
    issuer: TokenIssuer,
}

impl AuthorizationServer {
    /// `handler` handles both code issuance and refresh; in production it is
    /// the relay-wrapped standard handler.
    pub fn new(
        store: Arc<dyn AuthorizationStore>,
        clients: ClientRegistry,
        handler: Arc<dyn GrantHandler>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            store,
            clients,
            handler,
            issuer,
        }
    }

    pub fn issuer(&self) -> &str {
        self.issuer.issuer()
    }

    /// Check the client and redirect URI of an authorization request.
    ///
    /// Errors from here must not be sent to the redirect URI.
    pub fn validate_client(&self, request: &AuthorizationCodeRequest) -> Result<(), GrantError> {
        let client = self
            .clients
            .get(&request.client_id)
            .ok_or_else(|| GrantError::InvalidRequest("unknown client_id".into()))?;
        if !client.allows_redirect(&request.redirect_uri) {
            return Err(GrantError::InvalidRequest(
                "redirect_uri is not registered for this client".into(),
            ));
        }
        Ok(())
    }

    /// Issue an authorization code and build the client redirect.
    pub async fn authorize(
        &self,
        mut request: AuthorizationCodeRequest,
        ctx: &GrantContext,
    ) -> Result<Url, GrantError> {
        self.validate_client(&request)?;
        let client = self
            .clients
            .get(&request.client_id)
            .ok_or_else(|| GrantError::InvalidRequest("unknown client_id".into()))?;
        request.scopes = client.resolve_scopes(&request.scopes)?;

        if request.code_challenge.is_some()
            && request.code_challenge_method.as_deref() != Some("S256")
        {
            return Err(GrantError::InvalidRequest(
                "code_challenge_method must be S256".into(),
            ));
        }

        let result = self
            .handler
            .handle(&GrantRequest::AuthorizationCode(request.clone()), ctx)
            .await?;

        let mut redirect = Url::parse(&request.redirect_uri)
            .map_err(|e| GrantError::InvalidRequest(format!("invalid redirect_uri: {e}")))?;
        {
            let mut pairs = redirect.query_pairs_mut();
            pairs.append_pair("code", &result.token_value);
            if let Some(state) = &request.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(redirect)
    }

    /// `authorization_code` grant.
    pub async fn exchange_code(&self, exchange: CodeExchange) -> Result<TokenResponse, GrantError> {
        let client = self
            .clients
            .authenticate(&exchange.client_id, &exchange.client_secret)?;

        let mut record = self
            .store
            .consume_code(&exchange.code)
            .await
            .map_err(|e| GrantError::ServerError(e.to_string()))?
            .ok_or_else(|| {
                warn!(client_id = %client.client_id, "unknown or reused authorization code");
                GrantError::InvalidGrant("invalid authorization code".into())
            })?;

        if record.client_id != client.client_id {
            return Err(GrantError::InvalidGrant(
                "authorization code was issued to another client".into(),
            ));
        }
        let unexpired = record
            .authorization_code
            .as_ref()
            .is_some_and(|c| c.expires_at > Utc::now());
        if !unexpired {
            return Err(GrantError::InvalidGrant("authorization code expired".into()));
        }
        if exchange.redirect_uri.as_deref() != Some(record.redirect_uri.as_str()) {
            return Err(GrantError::InvalidGrant("redirect_uri mismatch".into()));
        }
        if let Some(challenge) = &record.code_challenge {
            let verifier = exchange
                .code_verifier
                .as_deref()
                .ok_or_else(|| GrantError::InvalidGrant("code_verifier required".into()))?;
            if compute_code_challenge(verifier) != *challenge {
                return Err(GrantError::InvalidGrant("PKCE verification failed".into()));
            }
        }
        if record.relayed_access_token().is_none() {
            debug!(authorization_id = %record.id, "no relayed access token on authorization");
        }

        let response = self.issuer.issue(&mut record)?;
        self.store
            .save(record)
            .await
            .map_err(|e| GrantError::ServerError(e.to_string()))?;
        Ok(response)
    }

    /// `refresh_token` grant.
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, GrantError> {
        let client = self.clients.authenticate(client_id, client_secret)?;
        let request = GrantRequest::RefreshToken(RefreshTokenRequest {
            client_id: client.client_id.clone(),
            refresh_token: refresh_token.to_string(),
        });
        self.handler
            .handle(&request, &GrantContext::default())
            .await?;

        let mut record = self
            .store
            .find_by_token(refresh_token, Some(TokenType::RefreshToken))
            .await
            .map_err(|e| GrantError::ServerError(e.to_string()))?
            .ok_or_else(|| GrantError::InvalidGrant("unknown refresh token".into()))?;
        let response = self.issuer.issue(&mut record)?;
        self.store
            .save(record)
            .await
            .map_err(|e| GrantError::ServerError(e.to_string()))?;
        Ok(response)
    }
}
