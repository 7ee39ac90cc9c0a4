//! OAuth2 client-side support for the upstream identity providers.
//!
//! Provides PKCE helpers, pending-login state, provider registrations and the
//! HTTP calls made against a provider (code exchange, refresh, user info).

pub mod client;
pub mod registration;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use client::{OAuthClient, ProviderTokenResponse};
pub use registration::ProviderRegistration;

/// TTL for pending login entries (10 minutes).
const STATE_TTL: Duration = Duration::from_secs(600);

/// Errors talking to an upstream provider.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid provider endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider response parse error: {0}")]
    Parse(String),

    #[error("User info is missing attribute '{0}'")]
    MissingAttribute(String),
}

// =============================================================================
// PKCE helpers
// =============================================================================

/// Generate a cryptographic PKCE code verifier (43–128 chars, URL-safe).
pub fn generate_code_verifier() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute S256 code challenge from a code verifier.
pub fn compute_code_challenge(verifier: &str) -> String {
    use base64::Engine;

    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a cryptographic state parameter (CSRF token).
pub fn generate_state() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Pending login state
// =============================================================================

/// Login in flight between the redirect to a provider and its callback.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub registration_id: String,
    /// Session cookie value of the browser that started the login.
    pub session_id: String,
    pub pkce_verifier: String,
    pub redirect_uri: String,
    pub created_at: Instant,
}

/// In-memory store for pending logins (keyed by state parameter).
pub struct OAuthStateStore {
    states: DashMap<String, PendingLogin>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            ttl,
        }
    }

    /// Insert a pending login.
    pub fn insert(&self, state_key: String, pending: PendingLogin) {
        self.states.insert(state_key, pending);
    }

    /// Take (remove and return) a pending login.
    /// Returns `None` if not found or expired.
    pub fn take(&self, state_key: &str) -> Option<PendingLogin> {
        let (_, pending) = self.states.remove(state_key)?;
        if pending.created_at.elapsed() > self.ttl {
            return None;
        }
        Some(pending)
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.states.retain(|_, v| v.created_at.elapsed() <= ttl);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingLogin {
        PendingLogin {
            registration_id: "github".into(),
            session_id: "sess-1".into(),
            pkce_verifier: "verifier".into(),
            redirect_uri: "http://127.0.0.1:9000/login/oauth2/code/github".into(),
            created_at: Instant::now(),
        }
    }

    #[test]
    fn code_verifier_is_url_safe_and_sufficient_length() {
        let verifier = generate_code_verifier();
        assert!(
            verifier.len() >= 43,
            "verifier too short: {}",
            verifier.len()
        );
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "verifier contains non-URL-safe chars: {verifier}"
        );
    }

    #[test]
    fn code_challenge_is_s256_of_verifier() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        // RFC 7636 test vector
        assert_eq!(
            compute_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn generate_state_produces_unique_values() {
        let s1 = generate_state();
        let s2 = generate_state();
        assert_ne!(s1, s2);
        assert!(s1.len() >= 20);
    }

    #[test]
    fn state_store_take_is_single_use() {
        let store = OAuthStateStore::new();
        store.insert("k".into(), pending());

        let taken = store.take("k");
        assert_eq!(taken.unwrap().registration_id, "github");
        assert!(store.take("k").is_none());
    }

    #[test]
    fn state_store_expired_entry_returns_none() {
        let store = OAuthStateStore::with_ttl(Duration::from_millis(10));
        store.insert("old".into(), pending());
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.take("old").is_none());
    }

    #[test]
    fn state_store_cleanup_removes_expired() {
        let store = OAuthStateStore::with_ttl(Duration::from_millis(50));
        store.insert("stale".into(), pending());
        std::thread::sleep(Duration::from_millis(80));
        store.insert("fresh".into(), pending());

        store.cleanup();
        assert!(store.take("fresh").is_some());
        assert!(store.take("stale").is_none());
    }
}
