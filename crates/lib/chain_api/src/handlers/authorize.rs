//! `GET /oauth2/authorize`

use axum::extract::{Query, State};
use axum::http::Uri;
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;
use chain_core::grant::{AuthorizationCodeRequest, GrantContext, GrantError};
use chain_core::models::AuthenticationResult;
use chain_core::session::{ChainSession, SAVED_REQUEST_KEY, load_authentication};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::AppState;
use crate::config::AdapterConfig;
use crate::error::{AppError, AppResult};
use crate::services::cookies::ensure_session;

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl AuthorizeParams {
    fn into_request(self) -> AuthorizationCodeRequest {
        AuthorizationCodeRequest {
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            scopes: self
                .scope
                .as_deref()
                .unwrap_or_default()
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            state: self.state,
            code_challenge: self.code_challenge,
            code_challenge_method: self.code_challenge_method,
        }
    }
}

/// Issue an authorization code once the chain is complete.
///
/// Without a login the request is saved and the browser sent to the primary
/// provider; after only the primary login it goes to the secondary provider.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
    uri: Uri,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    if params.response_type.as_deref() != Some("code") {
        return Err(AppError::Validation(
            "response_type must be 'code'".into(),
        ));
    }
    let request = params.into_request();
    state.server.validate_client(&request)?;

    let (jar, session) = ensure_session(jar, state.sessions.as_ref()).await;
    let authentication = load_authentication(state.sessions.as_ref(), &session).await;
    let chain = ChainSession::load(state.sessions.as_ref(), &session).await;

    let login_registration = match &authentication {
        None => Some(&state.config.primary.registration_id),
        Some(AuthenticationResult::Primary(_)) => Some(&state.config.secondary.registration_id),
        Some(AuthenticationResult::Secondary(_)) => None,
    };
    if let Some(registration_id) = login_registration {
        let saved = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        state
            .sessions
            .set(&session, SAVED_REQUEST_KEY, Value::String(saved))
            .await;
        debug!(registration = %registration_id, "login required before authorization");
        return Ok((
            jar,
            Redirect::to(&AdapterConfig::login_path(registration_id)),
        ));
    }

    let redirect_uri = request.redirect_uri.clone();
    let client_state = request.state.clone();
    let ctx = GrantContext {
        authentication,
        primary: chain.map(|c| c.primary),
    };
    match state.server.authorize(request, &ctx).await {
        Ok(location) => Ok((jar, Redirect::to(location.as_str()))),
        Err(e) => {
            warn!(error = %e, "authorization request failed");
            Ok((jar, error_redirect(&redirect_uri, &e, client_state.as_deref())?))
        }
    }
}

/// Report an error to the (already validated) client redirect URI.
fn error_redirect(
    redirect_uri: &str,
    error: &GrantError,
    state: Option<&str>,
) -> AppResult<Redirect> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| AppError::Validation(format!("invalid redirect_uri: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", error.code());
        pairs.append_pair("error_description", error.description());
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    Ok(Redirect::to(url.as_str()))
}
