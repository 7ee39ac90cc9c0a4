//! # chain_api
//!
//! HTTP surface of the chained authentication adapter: provider logins, the
//! authorization and token endpoints, metadata and logout.

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chain_core::authorization::AuthorizationStore;
use chain_core::chain::AuthenticationChainOrchestrator;
use chain_core::claims::ClaimMerger;
use chain_core::grant::{
    AuthorizationServer, ClientRegistry, GrantHandler, StandardGrantHandler, TokenIssuer,
};
use chain_core::oauth::{OAuthClient, OAuthStateStore};
use chain_core::relay::{HttpAuthorizedClientManager, TokenRelayInterceptor};
use chain_core::session::SessionStore;
use tower_http::trace::TraceLayer;

use crate::config::AdapterConfig;
use crate::error::AppError;
use crate::handlers::{authorize, login, logout, token, well_known};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AdapterConfig,
    pub sessions: Arc<dyn SessionStore>,
    /// Logins in flight, keyed by OAuth `state`.
    pub login_states: Arc<OAuthStateStore>,
    pub oauth: OAuthClient,
    pub clients: Arc<HttpAuthorizedClientManager>,
    pub orchestrator: Arc<AuthenticationChainOrchestrator>,
    pub server: Arc<AuthorizationServer>,
}

impl AppState {
    /// Wire the chain components from configuration and the two stores.
    pub fn new(
        config: AdapterConfig,
        sessions: Arc<dyn SessionStore>,
        authorizations: Arc<dyn AuthorizationStore>,
        login_states: Arc<OAuthStateStore>,
    ) -> Result<Self, AppError> {
        let oauth = OAuthClient::new(config.http_timeout)?;
        let clients = Arc::new(HttpAuthorizedClientManager::new(
            [config.primary.clone(), config.secondary.clone()],
            oauth.clone(),
        ));

        let base: Arc<dyn GrantHandler> =
            Arc::new(StandardGrantHandler::new(authorizations.clone()));
        let relay: Arc<dyn GrantHandler> = Arc::new(TokenRelayInterceptor::new(
            base,
            authorizations.clone(),
            clients.clone(),
            config.secondary.registration_id.clone(),
        ));
        let server = Arc::new(AuthorizationServer::new(
            authorizations,
            ClientRegistry::new([config.client.clone()]),
            relay,
            TokenIssuer::new(
                config.issuer.clone(),
                config.jwt_secret.as_bytes().to_vec(),
                ClaimMerger::new(config.relay_claim),
            ),
        ));

        let orchestrator = Arc::new(AuthenticationChainOrchestrator::new(
            sessions.clone(),
            AdapterConfig::login_path(&config.secondary.registration_id),
            config.default_success_url.clone(),
        ));

        Ok(Self {
            config,
            sessions,
            login_states,
            oauth,
            clients,
            orchestrator,
            server,
        })
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/oauth2/authorization/{registration}",
            get(login::login_start_handler),
        )
        .route(
            "/login/oauth2/code/{registration}",
            get(login::login_callback_handler),
        )
        .route("/oauth2/authorize", get(authorize::authorize_handler))
        .route("/oauth2/token", post(token::token_handler))
        .route(
            "/.well-known/oauth-authorization-server",
            get(well_known::authorization_server_metadata_handler),
        )
        .route("/logout", post(logout::logout_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
