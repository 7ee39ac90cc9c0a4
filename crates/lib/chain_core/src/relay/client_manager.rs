//! Authorized-client cache backed by the provider's token endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::{AuthorizeRequest, AuthorizedClientManager, RelayError};
use crate::models::AccessToken;
use crate::oauth::{OAuthClient, ProviderRegistration, ProviderTokenResponse};

type ClientKey = (String, String);

/// Tokens held for one principal at one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedClient {
    pub registration_id: String,
    pub principal_name: String,
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
}

/// Caches provider tokens saved at login and refreshes them on demand.
///
/// Removing a client keeps its refresh token, so the next `authorize` can
/// obtain a new access token without another browser login.
pub struct HttpAuthorizedClientManager {
    registrations: HashMap<String, ProviderRegistration>,
    oauth: OAuthClient,
    clients: DashMap<ClientKey, AuthorizedClient>,
    retained_refresh: DashMap<ClientKey, String>,
}

impl HttpAuthorizedClientManager {
    pub fn new(
        registrations: impl IntoIterator<Item = ProviderRegistration>,
        oauth: OAuthClient,
    ) -> Self {
        Self {
            registrations: registrations
                .into_iter()
                .map(|r| (r.registration_id.clone(), r))
                .collect(),
            oauth,
            clients: DashMap::new(),
            retained_refresh: DashMap::new(),
        }
    }

    fn key(registration_id: &str, principal_name: &str) -> ClientKey {
        (registration_id.to_string(), principal_name.to_string())
    }

    /// Store the tokens obtained by a login.
    pub fn save_authorized_client(
        &self,
        registration_id: &str,
        principal_name: &str,
        tokens: &ProviderTokenResponse,
    ) -> AuthorizedClient {
        let key = Self::key(registration_id, principal_name);
        let refresh_token = tokens
            .refresh_token
            .clone()
            .or_else(|| self.retained_refresh.get(&key).map(|r| r.value().clone()));
        let client = AuthorizedClient {
            registration_id: registration_id.to_string(),
            principal_name: principal_name.to_string(),
            access_token: tokens.to_access_token(),
            refresh_token,
        };
        self.retained_refresh.remove(&key);
        self.clients.insert(key, client.clone());
        debug!(
            registration = registration_id,
            principal = principal_name,
            "saved authorized client"
        );
        client
    }

    pub fn load_authorized_client(
        &self,
        registration_id: &str,
        principal_name: &str,
    ) -> Option<AuthorizedClient> {
        self.clients
            .get(&Self::key(registration_id, principal_name))
            .map(|c| c.value().clone())
    }

    fn refresh_token_for(&self, key: &ClientKey) -> Option<String> {
        self.clients
            .get(key)
            .and_then(|c| c.refresh_token.clone())
            .or_else(|| self.retained_refresh.get(key).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl AuthorizedClientManager for HttpAuthorizedClientManager {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AccessToken, RelayError> {
        let key = Self::key(&request.registration_id, &request.principal_name);
        if let Some(client) = self.clients.get(&key)
            && !client.access_token.is_expired(Utc::now())
        {
            return Ok(client.access_token.clone());
        }

        let registration = self
            .registrations
            .get(&request.registration_id)
            .ok_or_else(|| RelayError::UnknownRegistration(request.registration_id.clone()))?;
        let Some(refresh_token) = self.refresh_token_for(&key) else {
            return Err(RelayError::AuthorizationRequired {
                registration_id: request.registration_id.clone(),
                principal_name: request.principal_name.clone(),
            });
        };

        debug!(
            registration = %request.registration_id,
            principal = %request.principal_name,
            "refreshing authorized client"
        );
        let tokens = self.oauth.refresh_tokens(registration, &refresh_token).await?;
        let client = self.save_authorized_client(
            &request.registration_id,
            &request.principal_name,
            &tokens,
        );
        Ok(client.access_token)
    }

    async fn remove_authorized_client(&self, registration_id: &str, principal_name: &str) {
        let key = Self::key(registration_id, principal_name);
        match self.clients.remove(&key) {
            Some((key, client)) => {
                if let Some(refresh) = client.refresh_token {
                    self.retained_refresh.insert(key, refresh);
                }
            }
            None => warn!(
                registration = registration_id,
                principal = principal_name,
                "no authorized client to remove"
            ),
        }
    }
}
