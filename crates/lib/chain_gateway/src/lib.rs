//! # chain_gateway
//!
//! Gateway in front of the downstream resource server. Every request runs
//! through an ordered [`filter::FilterChain`] and is then proxied downstream.

pub mod config;
pub mod error;
pub mod filter;
pub mod proxy;

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::filter::auth_required::AuthenticationRequiredFilter;
use crate::filter::bearer::BearerSubstitutionFilter;
use crate::filter::metadata::ProtectedResourceMetadataFilter;
use crate::filter::{FilterChain, GatewayFilter};
use crate::proxy::ProxyUpstream;

/// Shared gateway state.
#[derive(Clone)]
pub struct GatewayState {
    pub chain: Arc<FilterChain>,
}

impl GatewayState {
    /// Compose the standard filter order in front of the downstream proxy.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(ProtectedResourceMetadataFilter::new(
                config.authorization_server.clone(),
                config.resource_name.clone(),
                config.default_scheme.clone(),
            )),
            Arc::new(AuthenticationRequiredFilter::new(
                config.default_scheme.clone(),
                config.jwt_secret.clone(),
            )),
            Arc::new(BearerSubstitutionFilter),
        ];
        let upstream = ProxyUpstream::new(&config.downstream_url, config.timeout)?;
        Ok(Self {
            chain: Arc::new(FilterChain::new(filters, Arc::new(upstream))),
        })
    }
}

async fn gateway_handler(State(state): State<GatewayState>, request: Request) -> Response {
    state.chain.handle(request).await
}

/// Builds the gateway router: everything goes through the filter chain.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .fallback(gateway_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
