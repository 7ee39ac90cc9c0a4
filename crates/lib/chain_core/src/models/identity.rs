//! Identity records and the tagged authentication result.
//!
//! These are internal domain models produced by parsing a provider's
//! user-info response. They are immutable once built.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which leg of the chain a provider plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    /// Provides the final token's subject.
    Primary,
    /// Provides supplementary claims and a relayed access token.
    Secondary,
}

/// A user identity as returned by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Provider registration id (e.g. `test-auth-server`, `github`).
    pub registration_id: String,
    /// OIDC subject, only set for OIDC providers.
    pub subject: Option<String>,
    pub preferred_username: Option<String>,
    pub name: Option<String>,
    /// Value of the provider's user-name attribute.
    pub principal_name: String,
    /// Granted authorities (`OIDC_USER`, `SCOPE_profile`, ...).
    pub authorities: Vec<String>,
    /// The full user-info document.
    pub raw_attributes: Map<String, Value>,
}

impl IdentityRecord {
    /// Raw attribute lookup. JSON `null` counts as absent.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.raw_attributes.get(key).filter(|v| !v.is_null())
    }

    /// Attribute rendered as a string. Numbers and booleans are stringified;
    /// arrays and objects are not considered string-valued.
    pub fn attribute_str(&self, key: &str) -> Option<String> {
        match self.attribute(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Result of a successful login, tagged by the provider's role in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "identity", rename_all = "snake_case")]
pub enum AuthenticationResult {
    Primary(IdentityRecord),
    Secondary(IdentityRecord),
}

impl AuthenticationResult {
    pub fn identity(&self) -> &IdentityRecord {
        match self {
            AuthenticationResult::Primary(identity) | AuthenticationResult::Secondary(identity) => {
                identity
            }
        }
    }

    pub fn role(&self) -> ProviderRole {
        match self {
            AuthenticationResult::Primary(_) => ProviderRole::Primary,
            AuthenticationResult::Secondary(_) => ProviderRole::Secondary,
        }
    }

    pub fn principal_name(&self) -> &str {
        &self.identity().principal_name
    }

    pub fn registration_id(&self) -> &str {
        &self.identity().registration_id
    }
}
