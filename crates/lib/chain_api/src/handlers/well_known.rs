//! `GET /.well-known/oauth-authorization-server`

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::AppState;

/// RFC 8414 authorization-server metadata.
pub async fn authorization_server_metadata_handler(State(state): State<AppState>) -> Json<Value> {
    let issuer = &state.config.issuer;
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "scopes_supported": state.config.client.scopes,
    }))
}
