//! Browser sessions and the chain session state machine.
//!
//! A session is an injected key-value capability ([`SessionStore`]). The chain
//! state lives under the well-known [`PRIMARY_AUTHENTICATION_KEY`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{AuthenticationResult, IdentityRecord};

/// Session attribute holding the primary authentication record.
pub const PRIMARY_AUTHENTICATION_KEY: &str = "PRIMARY_AUTHENTICATION";

/// Session attribute holding the currently active authentication.
pub const SECURITY_CONTEXT_KEY: &str = "SECURITY_CONTEXT";

/// Session attribute holding the request to resume after login.
pub const SAVED_REQUEST_KEY: &str = "SAVED_REQUEST";

/// Idle timeout for in-memory sessions (30 minutes).
const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Opaque session identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a random 256-bit URL-safe session id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key-value session capability.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session: &SessionId, key: &str) -> Option<Value>;

    async fn set(&self, session: &SessionId, key: &str, value: Value);

    async fn remove(&self, session: &SessionId, key: &str) -> Option<Value>;

    /// Drop the session and all of its attributes.
    async fn invalidate(&self, session: &SessionId);

    /// Whether a live session exists under this id.
    async fn contains(&self, session: &SessionId) -> bool;

    /// Move the attributes to a freshly generated id and drop the old one.
    ///
    /// An unknown or expired session rotates into an empty one.
    async fn rotate(&self, session: &SessionId) -> SessionId;
}

struct SessionEntry {
    attributes: HashMap<String, Value>,
    last_access: Instant,
}

impl SessionEntry {
    fn new(attributes: HashMap<String, Value>) -> Self {
        Self {
            attributes,
            last_access: Instant::now(),
        }
    }
}

/// In-memory session store with idle expiry.
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Evict idle sessions.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.sessions
            .retain(|_, entry| entry.last_access.elapsed() <= ttl);
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

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session: &SessionId, key: &str) -> Option<Value> {
        let mut entry = self.sessions.get_mut(session)?;
        if entry.last_access.elapsed() > self.ttl {
            drop(entry);
            self.sessions.remove(session);
            return None;
        }
        entry.last_access = Instant::now();
        entry.attributes.get(key).cloned()
    }

    async fn set(&self, session: &SessionId, key: &str, value: Value) {
        let mut entry = self
            .sessions
            .entry(session.clone())
            .or_insert_with(|| SessionEntry::new(HashMap::new()));
        if entry.last_access.elapsed() > self.ttl {
            entry.attributes.clear();
        }
        entry.last_access = Instant::now();
        entry.attributes.insert(key.to_string(), value);
    }

    async fn remove(&self, session: &SessionId, key: &str) -> Option<Value> {
        let mut entry = self.sessions.get_mut(session)?;
        if entry.last_access.elapsed() > self.ttl {
            drop(entry);
            self.sessions.remove(session);
            return None;
        }
        entry.attributes.remove(key)
    }

    async fn invalidate(&self, session: &SessionId) {
        self.sessions.remove(session);
    }

    async fn contains(&self, session: &SessionId) -> bool {
        self.sessions
            .get(session)
            .is_some_and(|entry| entry.last_access.elapsed() <= self.ttl)
    }

    async fn rotate(&self, session: &SessionId) -> SessionId {
        let ttl = self.ttl;
        let attributes = self
            .sessions
            .remove(session)
            .filter(|(_, entry)| entry.last_access.elapsed() <= ttl)
            .map(|(_, entry)| entry.attributes)
            .unwrap_or_default();
        let fresh = SessionId::generate();
        self.sessions
            .insert(fresh.clone(), SessionEntry::new(attributes));
        debug!("session id rotated");
        fresh
    }
}

/// Position of a session in the two-step login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainState {
    AwaitingSecondary,
    Complete,
}

/// Chain state for one browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSession {
    pub session_id: SessionId,
    pub primary: IdentityRecord,
    pub state: ChainState,
}

impl ChainSession {
    /// Start a chain after a primary login.
    pub fn begin(session_id: SessionId, primary: IdentityRecord) -> Self {
        Self {
            session_id,
            primary,
            state: ChainState::AwaitingSecondary,
        }
    }

    /// Move to `Complete`. Returns `false` when already complete.
    pub fn complete(&mut self) -> bool {
        match self.state {
            ChainState::AwaitingSecondary => {
                self.state = ChainState::Complete;
                true
            }
            ChainState::Complete => false,
        }
    }

    /// Load the chain from the session, if one was started.
    ///
    /// The chain is rebound to `session_id`, which differs from the stored id
    /// once the session has been rotated.
    pub async fn load(store: &dyn SessionStore, session_id: &SessionId) -> Option<Self> {
        let value = store.get(session_id, PRIMARY_AUTHENTICATION_KEY).await?;
        match serde_json::from_value::<Self>(value) {
            Ok(mut chain) => {
                chain.session_id = session_id.clone();
                Some(chain)
            }
            Err(e) => {
                warn!(
                    key = PRIMARY_AUTHENTICATION_KEY,
                    error = %e,
                    "session attribute is not a chain session"
                );
                None
            }
        }
    }

    /// Write the chain into the session under the well-known key.
    pub async fn save(&self, store: &dyn SessionStore) {
        match serde_json::to_value(self) {
            Ok(value) => {
                store
                    .set(&self.session_id, PRIMARY_AUTHENTICATION_KEY, value)
                    .await;
                debug!(state = ?self.state, "chain session saved");
            }
            Err(e) => warn!(error = %e, "failed to serialize chain session"),
        }
    }
}

/// Read the active authentication from the session.
pub async fn load_authentication(
    store: &dyn SessionStore,
    session_id: &SessionId,
) -> Option<AuthenticationResult> {
    let value = store.get(session_id, SECURITY_CONTEXT_KEY).await?;
    serde_json::from_value(value).ok()
}

/// Record the active authentication in the session.
pub async fn save_authentication(
    store: &dyn SessionStore,
    session_id: &SessionId,
    authentication: &AuthenticationResult,
) {
    if let Ok(value) = serde_json::to_value(authentication) {
        store.set(session_id, SECURITY_CONTEXT_KEY, value).await;
    }
}
