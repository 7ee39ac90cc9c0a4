//! Login success handling for the primary → secondary chain.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::models::AuthenticationResult;
use crate::session::{
    ChainSession, SAVED_REQUEST_KEY, SessionId, SessionStore, save_authentication,
};

/// Where the browser goes after a login callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Primary login done; start the secondary login.
    RedirectToSecondary { location: String },
    /// Chain finished (or degraded); resume the saved request.
    Continue { location: String, degraded: bool },
}

impl LoginOutcome {
    pub fn location(&self) -> &str {
        match self {
            LoginOutcome::RedirectToSecondary { location }
            | LoginOutcome::Continue { location, .. } => location,
        }
    }
}

/// Runs after each successful provider login.
pub struct AuthenticationChainOrchestrator {
    sessions: Arc<dyn SessionStore>,
    secondary_login_path: String,
    default_success_url: String,
}

impl AuthenticationChainOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        secondary_login_path: impl Into<String>,
        default_success_url: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            secondary_login_path: secondary_login_path.into(),
            default_success_url: default_success_url.into(),
        }
    }

    pub async fn on_authentication_success(
        &self,
        authentication: &AuthenticationResult,
        session_id: &SessionId,
    ) -> LoginOutcome {
        save_authentication(self.sessions.as_ref(), session_id, authentication).await;

        match authentication {
            AuthenticationResult::Primary(identity) => {
                ChainSession::begin(session_id.clone(), identity.clone())
                    .save(self.sessions.as_ref())
                    .await;
                info!(
                    registration = %identity.registration_id,
                    principal = %identity.principal_name,
                    "primary login complete; redirecting to secondary login"
                );
                LoginOutcome::RedirectToSecondary {
                    location: self.secondary_login_path.clone(),
                }
            }
            AuthenticationResult::Secondary(identity) => {
                let degraded =
                    match ChainSession::load(self.sessions.as_ref(), session_id).await {
                        Some(mut chain) => {
                            if chain.complete() {
                                chain.save(self.sessions.as_ref()).await;
                            } else {
                                debug!("repeated secondary login on a complete chain");
                            }
                            info!(
                                primary = %chain.primary.principal_name,
                                secondary = %identity.principal_name,
                                "authentication chain complete"
                            );
                            false
                        }
                        None => {
                            error!(
                                registration = %identity.registration_id,
                                principal = %identity.principal_name,
                                "secondary login without a primary authentication in session"
                            );
                            true
                        }
                    };
                LoginOutcome::Continue {
                    location: self.take_saved_request(session_id).await,
                    degraded,
                }
            }
        }
    }

    async fn take_saved_request(&self, session_id: &SessionId) -> String {
        match self.sessions.remove(session_id, SAVED_REQUEST_KEY).await {
            Some(Value::String(url)) if !url.is_empty() => url,
            _ => self.default_success_url.clone(),
        }
    }
}
