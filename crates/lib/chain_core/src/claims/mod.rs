//! Final claim-set composition.
//!
//! [`ClaimMerger`] runs at token-issuance time. It reads the primary identity
//! and the active authentication from an explicit [`ClaimContext`] and writes
//! the merged claims into the token being minted. It never performs I/O.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::models::{AuthenticationResult, IdentityRecord};

/// Claim that carries the primary provider's subject.
pub const PRIMARY_SUBJECT_CLAIM: &str = "test_auth_server_sub";

/// Secondary attribute → claim mapping.
const SECONDARY_CLAIMS: [(&str, &str); 5] = [
    ("login", "github_login"),
    ("name", "github_name"),
    ("email", "github_email"),
    ("id", "github_id"),
    ("avatar_url", "github_avatar_url"),
];

/// Claim name under which the relayed secondary access token is embedded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayClaim {
    /// `github_access_token`
    GithubAccessToken,
    /// `access_token`, read by the gateway's bearer substitution.
    #[default]
    AccessToken,
}

impl RelayClaim {
    pub fn claim_name(self) -> &'static str {
        match self {
            RelayClaim::GithubAccessToken => "github_access_token",
            RelayClaim::AccessToken => "access_token",
        }
    }
}

impl std::str::FromStr for RelayClaim {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github_access_token" => Ok(RelayClaim::GithubAccessToken),
            "access_token" => Ok(RelayClaim::AccessToken),
            other => Err(format!("unknown relay claim: {other}")),
        }
    }
}

/// Everything the merger needs, threaded in explicitly.
#[derive(Debug, Clone, Copy)]
pub struct ClaimContext<'a> {
    /// Primary identity snapshotted at code issuance.
    pub primary: Option<&'a IdentityRecord>,
    /// Authentication active at code issuance.
    pub active: &'a AuthenticationResult,
    pub relayed_access_token: Option<&'a str>,
}

/// Composes the final claim set from two identities and the relayed token.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimMerger {
    relay_claim: RelayClaim,
}

impl ClaimMerger {
    pub fn new(relay_claim: RelayClaim) -> Self {
        Self { relay_claim }
    }

    pub fn relay_claim(&self) -> RelayClaim {
        self.relay_claim
    }

    /// Merge identity claims into `claims`.
    pub fn merge(&self, ctx: &ClaimContext<'_>, claims: &mut Map<String, Value>) {
        match ctx.primary {
            Some(primary) => self.merge_primary(primary, claims),
            None => warn!(
                principal = ctx.active.principal_name(),
                "no primary identity for token; issuing without primary claims"
            ),
        }

        if let AuthenticationResult::Secondary(secondary) = ctx.active {
            Self::merge_secondary(secondary, claims);
            if let Some(token) = ctx.relayed_access_token {
                claims.insert(
                    self.relay_claim.claim_name().to_string(),
                    Value::String(token.to_string()),
                );
            }
        }

        let authorities = ctx
            .active
            .identity()
            .authorities
            .iter()
            .cloned()
            .map(Value::String)
            .collect();
        claims.insert("authorities".to_string(), Value::Array(authorities));
    }

    fn merge_primary(&self, primary: &IdentityRecord, claims: &mut Map<String, Value>) {
        let Some(subject) = primary_subject(primary) else {
            error!(
                registration = %primary.registration_id,
                "primary identity has no subject; sub claim not overridden"
            );
            return;
        };
        debug!(subject = %subject, "merging primary identity claims");
        claims.insert(
            PRIMARY_SUBJECT_CLAIM.to_string(),
            Value::String(subject.clone()),
        );
        claims.insert("sub".to_string(), Value::String(subject));
        if let Some(username) = &primary.preferred_username {
            claims.insert(
                "preferred_username".to_string(),
                Value::String(username.clone()),
            );
        }
        if let Some(name) = &primary.name {
            claims.insert("name".to_string(), Value::String(name.clone()));
        }
    }

    fn merge_secondary(secondary: &IdentityRecord, claims: &mut Map<String, Value>) {
        for (attribute, claim) in SECONDARY_CLAIMS {
            if let Some(value) = secondary.attribute(attribute) {
                claims.insert(claim.to_string(), value.clone());
            }
        }
    }
}

/// OIDC subject, else the generic `sub` attribute.
fn primary_subject(primary: &IdentityRecord) -> Option<String> {
    primary
        .subject
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| primary.attribute_str("sub").filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn primary() -> IdentityRecord {
        IdentityRecord {
            registration_id: "test-auth-server".into(),
            subject: Some("user-1".into()),
            preferred_username: Some("alice".into()),
            name: Some("Alice".into()),
            principal_name: "user-1".into(),
            authorities: vec!["OIDC_USER".into()],
            raw_attributes: Default::default(),
        }
    }

    fn github(attrs: Value) -> IdentityRecord {
        IdentityRecord {
            registration_id: "github".into(),
            subject: None,
            preferred_username: None,
            name: None,
            principal_name: "42".into(),
            authorities: vec!["OAUTH2_USER".into(), "SCOPE_read:user".into()],
            raw_attributes: attrs.as_object().cloned().unwrap(),
        }
    }

    fn base_claims() -> Map<String, Value> {
        json!({"sub": "42", "aud": "test-app"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn sub_is_primary_subject() {
        let primary = primary();
        let active = AuthenticationResult::Secondary(github(json!({"id": 42})));
        let mut claims = base_claims();
        ClaimMerger::default().merge(
            &ClaimContext {
                primary: Some(&primary),
                active: &active,
                relayed_access_token: None,
            },
            &mut claims,
        );
        assert_eq!(claims["sub"], "user-1");
        assert_eq!(claims[PRIMARY_SUBJECT_CLAIM], "user-1");
        assert_eq!(claims["preferred_username"], "alice");
        assert_eq!(claims["name"], "Alice");
    }

    #[test]
    fn generic_sub_attribute_is_fallback_subject() {
        let mut primary = primary();
        primary.subject = None;
        primary.raw_attributes = json!({"sub": "fallback"}).as_object().cloned().unwrap();
        let active = AuthenticationResult::Primary(primary.clone());
        let mut claims = base_claims();
        ClaimMerger::default().merge(
            &ClaimContext {
                primary: Some(&primary),
                active: &active,
                relayed_access_token: None,
            },
            &mut claims,
        );
        assert_eq!(claims["sub"], "fallback");
    }

    #[test]
    fn unresolvable_subject_leaves_sub_untouched() {
        let mut primary = primary();
        primary.subject = None;
        let active = AuthenticationResult::Secondary(github(json!({})));
        let mut claims = base_claims();
        ClaimMerger::default().merge(
            &ClaimContext {
                primary: Some(&primary),
                active: &active,
                relayed_access_token: None,
            },
            &mut claims,
        );
        assert_eq!(claims["sub"], "42");
        assert!(!claims.contains_key(PRIMARY_SUBJECT_CLAIM));
        assert!(!claims.contains_key("preferred_username"));
    }

    #[test]
    fn secondary_attributes_map_only_when_present() {
        let primary = primary();
        let active = AuthenticationResult::Secondary(github(json!({
            "login": "octocat",
            "id": 583231,
            "email": null,
            "avatar_url": "https://avatars.example/u/1"
        })));
        let mut claims = base_claims();
        ClaimMerger::default().merge(
            &ClaimContext {
                primary: Some(&primary),
                active: &active,
                relayed_access_token: None,
            },
            &mut claims,
        );
        assert_eq!(claims["github_login"], "octocat");
        assert_eq!(claims["github_id"], 583231);
        assert_eq!(claims["github_avatar_url"], "https://avatars.example/u/1");
        assert!(!claims.contains_key("github_name"));
        assert!(!claims.contains_key("github_email"));
    }

    #[test]
    fn relayed_token_uses_configured_claim() {
        let primary = primary();
        let active = AuthenticationResult::Secondary(github(json!({"id": 42})));
        let ctx = ClaimContext {
            primary: Some(&primary),
            active: &active,
            relayed_access_token: Some("gho_abc"),
        };

        let mut relay = base_claims();
        ClaimMerger::new(RelayClaim::AccessToken).merge(&ctx, &mut relay);
        assert_eq!(relay["access_token"], "gho_abc");
        assert!(!relay.contains_key("github_access_token"));

        let mut chained = base_claims();
        ClaimMerger::new(RelayClaim::GithubAccessToken).merge(&ctx, &mut chained);
        assert_eq!(chained["github_access_token"], "gho_abc");
        assert!(!chained.contains_key("access_token"));
    }

    #[test]
    fn authorities_always_copied_from_active() {
        let active = AuthenticationResult::Secondary(github(json!({})));
        let mut claims = base_claims();
        ClaimMerger::default().merge(
            &ClaimContext {
                primary: None,
                active: &active,
                relayed_access_token: None,
            },
            &mut claims,
        );
        assert_eq!(claims["authorities"], json!(["OAUTH2_USER", "SCOPE_read:user"]));
        assert_eq!(claims["sub"], "42");
    }

    #[test]
    fn primary_active_gets_no_github_claims() {
        let primary = primary();
        let active = AuthenticationResult::Primary(primary.clone());
        let mut claims = base_claims();
        ClaimMerger::default().merge(
            &ClaimContext {
                primary: Some(&primary),
                active: &active,
                relayed_access_token: Some("ignored"),
            },
            &mut claims,
        );
        assert!(!claims.contains_key("access_token"));
        assert!(!claims.keys().any(|k| k.starts_with("github_")));
    }

    #[test]
    fn relay_claim_parses_from_config_value() {
        assert_eq!(
            "github_access_token".parse::<RelayClaim>().unwrap(),
            RelayClaim::GithubAccessToken
        );
        assert!("bogus".parse::<RelayClaim>().is_err());
    }
}
