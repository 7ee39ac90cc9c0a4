//! Secondary-provider access tokens as cached by the authorized-client manager.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An OAuth2 access token issued by an upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl AccessToken {
    /// Whether the token was issued before `now - window`.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.issued_at < now - window
    }

    /// Whether the token has passed its expiry. Tokens without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_issued(ago_secs: i64) -> AccessToken {
        AccessToken {
            value: "gho_x".into(),
            issued_at: Utc::now() - Duration::seconds(ago_secs),
            expires_at: None,
            scopes: vec![],
        }
    }

    #[test]
    fn stale_after_window() {
        let now = Utc::now();
        assert!(token_issued(130).is_stale(now, Duration::seconds(120)));
        assert!(!token_issued(10).is_stale(now, Duration::seconds(120)));
    }

    #[test]
    fn token_without_expiry_never_expires() {
        assert!(!token_issued(100_000).is_expired(Utc::now()));
    }

    #[test]
    fn expired_when_past_expiry() {
        let mut token = token_issued(0);
        token.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(token.is_expired(Utc::now()));
    }
}
