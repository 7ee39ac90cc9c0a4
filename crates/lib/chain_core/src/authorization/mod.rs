//! Authorization record storage.
//!
//! The store is an external collaborator; [`AuthorizationStore`] is the seam
//! and [`InMemoryAuthorizationStore`] a `DashMap`-backed implementation.
//! Code consumption is at-most-once: the index entry for a code is removed
//! atomically by the first caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::models::{AuthorizationRecord, TokenType};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Authorization store unavailable: {0}")]
    Unavailable(String),
}

/// Persists and looks up authorization records by code or token value.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Insert or replace a record, re-indexing all of its values.
    async fn save(&self, record: AuthorizationRecord) -> Result<(), StoreError>;

    /// Find the record owning `value`, optionally restricted to one token type.
    async fn find_by_token(
        &self,
        value: &str,
        token_type: Option<TokenType>,
    ) -> Result<Option<AuthorizationRecord>, StoreError>;

    /// Redeem an authorization code. Returns `None` when the code is unknown
    /// or was already consumed. The returned record has the code invalidated.
    async fn consume_code(&self, code: &str) -> Result<Option<AuthorizationRecord>, StoreError>;

    /// Remove a record and every value pointing at it.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory store keyed by record id, with a value → id index.
#[derive(Default)]
pub struct InMemoryAuthorizationStore {
    records: DashMap<String, AuthorizationRecord>,
    index: DashMap<String, (String, TokenType)>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop the index entries of `record` that still point at it.
    fn unindex(&self, record: &AuthorizationRecord) {
        for ty in [TokenType::Code, TokenType::AccessToken, TokenType::RefreshToken] {
            if let Some(token) = record.token(ty) {
                self.index
                    .remove_if(&token.value, |_, (rid, _)| *rid == record.id);
            }
        }
    }

    /// Evict records whose codes and tokens have all expired.
    pub fn cleanup(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.is_expired(now))
            .map(|r| r.key().clone())
            .collect();
        for id in &expired {
            if let Some((_, record)) = self.records.remove(id) {
                self.unindex(&record);
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "evicted expired authorizations");
        }
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

#[async_trait]
impl AuthorizationStore for InMemoryAuthorizationStore {
    async fn save(&self, record: AuthorizationRecord) -> Result<(), StoreError> {
        let prior = self.records.get(&record.id).map(|r| r.value().clone());
        if let Some(prior) = prior {
            self.unindex(&prior);
        }
        for (value, ty) in record.index_keys() {
            self.index.insert(value, (record.id.clone(), ty));
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn find_by_token(
        &self,
        value: &str,
        token_type: Option<TokenType>,
    ) -> Result<Option<AuthorizationRecord>, StoreError> {
        let Some((id, ty)) = self.index.get(value).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        if token_type.is_some_and(|wanted| wanted != ty) {
            return Ok(None);
        }
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn consume_code(&self, code: &str) -> Result<Option<AuthorizationRecord>, StoreError> {
        let Some((_, (id, ty))) = self.index.remove(code) else {
            return Ok(None);
        };
        if ty != TokenType::Code {
            // Not a code; put the entry back untouched.
            self.index.insert(code.to_string(), (id, ty));
            return Ok(None);
        }
        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(code) = record.authorization_code.as_mut() {
            code.invalidated = true;
        }
        Ok(Some(record.clone()))
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        if let Some((_, record)) = self.records.remove(id) {
            self.unindex(&record);
        }
        Ok(())
    }
}
