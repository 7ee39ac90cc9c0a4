//! Secondary access-token relay.
//!
//! [`TokenRelayInterceptor`] wraps a [`GrantHandler`]. After the delegate has
//! issued a code (or accepted a refresh token) it obtains the secondary
//! provider's access token for the principal and stores it on the
//! authorization record under [`ACCESS_TOKEN_ATTRIBUTE`]. On code issuance a
//! token older than the freshness window is replaced first; refresh only
//! authorizes on demand. Any failure fails the grant.

pub mod client_manager;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::authorization::AuthorizationStore;
use crate::grant::{GrantContext, GrantError, GrantHandler, GrantRequest, GrantResult};
use crate::models::AccessToken;
use crate::models::authorization::ACCESS_TOKEN_ATTRIBUTE;
use crate::oauth::OAuthError;

pub use client_manager::{AuthorizedClient, HttpAuthorizedClientManager};

/// Cached secondary tokens older than this are replaced before being relayed.
pub const FRESHNESS_WINDOW_SECS: i64 = 120;

/// Errors obtaining the secondary access token.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No authorized client for '{registration_id}' and principal '{principal_name}'")]
    AuthorizationRequired {
        registration_id: String,
        principal_name: String,
    },

    #[error("Unknown provider registration: {0}")]
    UnknownRegistration(String),

    #[error(transparent)]
    Provider(#[from] OAuthError),
}

/// Who to authorize, against which provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub registration_id: String,
    pub principal_name: String,
}

/// Source of provider access tokens for (registration, principal) pairs.
#[async_trait]
pub trait AuthorizedClientManager: Send + Sync {
    /// Return a usable access token, refreshing or failing when none is cached.
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AccessToken, RelayError>;

    /// Forget the cached client so the next `authorize` obtains a new token.
    async fn remove_authorized_client(&self, registration_id: &str, principal_name: &str);
}

/// Grant handler decorator that relays the secondary access token.
pub struct TokenRelayInterceptor {
    delegate: Arc<dyn GrantHandler>,
    store: Arc<dyn AuthorizationStore>,
    clients: Arc<dyn AuthorizedClientManager>,
    secondary_registration: String,
    freshness_window: Duration,
}

impl TokenRelayInterceptor {
    pub fn new(
        delegate: Arc<dyn GrantHandler>,
        store: Arc<dyn AuthorizationStore>,
        clients: Arc<dyn AuthorizedClientManager>,
        secondary_registration: impl Into<String>,
    ) -> Self {
        Self {
            delegate,
            store,
            clients,
            secondary_registration: secondary_registration.into(),
            freshness_window: Duration::seconds(FRESHNESS_WINDOW_SECS),
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    fn authorize_request(&self, principal_name: &str) -> AuthorizeRequest {
        AuthorizeRequest {
            registration_id: self.secondary_registration.clone(),
            principal_name: principal_name.to_string(),
        }
    }

    /// Authorize for `principal_name`, re-authorizing once when the cached
    /// token is older than the freshness window.
    pub async fn obtain_fresh_token(&self, principal_name: &str) -> Result<AccessToken, RelayError> {
        let request = self.authorize_request(principal_name);
        let token = self.clients.authorize(&request).await?;
        if !token.is_stale(Utc::now(), self.freshness_window) {
            return Ok(token);
        }

        debug!(
            registration = %self.secondary_registration,
            principal = principal_name,
            issued_at = %token.issued_at,
            "cached secondary token is stale; re-authorizing"
        );
        self.clients
            .remove_authorized_client(&self.secondary_registration, principal_name)
            .await;
        self.clients.authorize(&request).await
    }
}

#[async_trait]
impl GrantHandler for TokenRelayInterceptor {
    async fn handle(
        &self,
        request: &GrantRequest,
        ctx: &GrantContext,
    ) -> Result<GrantResult, GrantError> {
        let result = self.delegate.handle(request, ctx).await?;

        let mut record = self
            .store
            .find_by_token(&result.token_value, Some(result.token_type))
            .await
            .map_err(|e| GrantError::ServerError(e.to_string()))?
            .ok_or_else(|| {
                error!(
                    authorization_id = %result.authorization_id,
                    "issued authorization not found in store"
                );
                GrantError::ServerError("authorization not persisted".into())
            })?;

        let principal_name = match request {
            GrantRequest::AuthorizationCode(_) => ctx
                .authentication
                .as_ref()
                .map(|a| a.principal_name().to_string())
                .unwrap_or_else(|| result.principal_name.clone()),
            GrantRequest::RefreshToken(_) => record.principal_name.clone(),
        };

        let obtained = match request {
            GrantRequest::AuthorizationCode(_) => self.obtain_fresh_token(&principal_name).await,
            GrantRequest::RefreshToken(_) => {
                self.clients
                    .authorize(&self.authorize_request(&principal_name))
                    .await
            }
        };
        let token = match obtained {
            Ok(token) => token,
            Err(e) => {
                error!(
                    registration = %self.secondary_registration,
                    principal = %principal_name,
                    error = %e,
                    "failed to obtain secondary access token"
                );
                if matches!(request, GrantRequest::AuthorizationCode(_))
                    && let Err(remove_err) = self.store.remove(&record.id).await
                {
                    error!(error = %remove_err, "failed to revoke authorization code");
                }
                return Err(GrantError::ServerError(
                    "unable to obtain downstream access token".into(),
                ));
            }
        };

        record
            .attributes
            .insert(ACCESS_TOKEN_ATTRIBUTE.to_string(), token.value);
        self.store
            .save(record)
            .await
            .map_err(|e| GrantError::ServerError(e.to_string()))?;
        info!(
            grant_type = result.grant_type.as_str(),
            authorization_id = %result.authorization_id,
            "relayed secondary access token"
        );
        Ok(result)
    }
}
