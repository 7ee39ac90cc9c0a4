//! Registered clients of the adapter's authorization server.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::GrantError;

/// A statically registered OAuth client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
}

impl RegisteredClient {
    /// Compare secrets by digest so the comparison length never depends on input.
    pub fn secret_matches(&self, presented: &str) -> bool {
        Sha256::digest(self.client_secret.as_bytes()) == Sha256::digest(presented.as_bytes())
    }

    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    /// Requested scopes, or the client's scopes when none were requested.
    pub fn resolve_scopes(&self, requested: &[String]) -> Result<Vec<String>, GrantError> {
        if requested.is_empty() {
            return Ok(self.scopes.clone());
        }
        if let Some(unknown) = requested.iter().find(|s| !self.scopes.contains(s)) {
            return Err(GrantError::InvalidScope(format!(
                "scope '{unknown}' is not allowed for this client"
            )));
        }
        Ok(requested.to_vec())
    }
}

/// In-memory client registry.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, RegisteredClient>,
}

impl ClientRegistry {
    pub fn new(clients: impl IntoIterator<Item = RegisteredClient>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }

    pub fn get(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    /// Authenticate a confidential client.
    pub fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<&RegisteredClient, GrantError> {
        match self.clients.get(client_id) {
            Some(client) if client.secret_matches(client_secret) => Ok(client),
            _ => Err(GrantError::InvalidClient(
                "client authentication failed".into(),
            )),
        }
    }
}
