//! Upstream provider registrations and user-info parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::OAuthError;
use crate::models::{AuthenticationResult, IdentityRecord, ProviderRole};

/// Client registration at an upstream identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub registration_id: String,
    pub role: ProviderRole,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_uri: String,
    pub token_uri: String,
    pub user_info_uri: String,
    /// User-info attribute that names the principal (`sub` for OIDC, `id` for GitHub).
    pub user_name_attribute: String,
    pub scopes: Vec<String>,
    /// Whether the provider speaks OIDC (user info carries an OIDC `sub`).
    pub oidc: bool,
}

impl ProviderRegistration {
    /// Build the provider authorization URL for a PKCE login.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, OAuthError> {
        let mut url = Url::parse(&self.authorization_uri)
            .map_err(|e| OAuthError::InvalidEndpoint(format!("{}: {e}", self.authorization_uri)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    /// Parse a user-info document into an identity.
    ///
    /// Fails when the user-name attribute is missing, since the principal
    /// cannot be named without it.
    pub fn parse_identity(
        &self,
        attributes: Map<String, Value>,
        granted_scopes: &[String],
    ) -> Result<IdentityRecord, OAuthError> {
        let principal_name = match attributes.get(&self.user_name_attribute) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(OAuthError::MissingAttribute(self.user_name_attribute.clone())),
        };

        let string_attr = |key: &str| {
            attributes
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let mut authorities = vec![if self.oidc { "OIDC_USER" } else { "OAUTH2_USER" }.to_string()];
        authorities.extend(granted_scopes.iter().map(|s| format!("SCOPE_{s}")));

        Ok(IdentityRecord {
            registration_id: self.registration_id.clone(),
            subject: if self.oidc { string_attr("sub") } else { None },
            preferred_username: string_attr("preferred_username"),
            name: string_attr("name"),
            principal_name,
            authorities,
            raw_attributes: attributes,
        })
    }

    /// Tag an identity with this provider's role in the chain.
    pub fn authenticate(&self, identity: IdentityRecord) -> AuthenticationResult {
        match self.role {
            ProviderRole::Primary => AuthenticationResult::Primary(identity),
            ProviderRole::Secondary => AuthenticationResult::Secondary(identity),
        }
    }
}
