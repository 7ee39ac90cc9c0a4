//! Provider login start and callback handlers.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;
use chain_core::oauth::{PendingLogin, compute_code_challenge, generate_code_verifier, generate_state};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::services::cookies::{ensure_session, rotate_session, session_id};
use crate::services::login::complete_login;

/// `GET /oauth2/authorization/{registration}`: redirect to the provider.
pub async fn login_start_handler(
    State(state): State<AppState>,
    Path(registration_id): Path<String>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let registration = state
        .config
        .registration(&registration_id)
        .ok_or_else(|| AppError::NotFound(format!("provider '{registration_id}'")))?;
    let (jar, session) = ensure_session(jar, state.sessions.as_ref()).await;

    let verifier = generate_code_verifier();
    let challenge = compute_code_challenge(&verifier);
    let oauth_state = generate_state();
    let redirect_uri = state.config.callback_url(&registration_id);
    let url = registration.authorization_url(&redirect_uri, &oauth_state, &challenge)?;

    state.login_states.insert(
        oauth_state,
        PendingLogin {
            registration_id: registration_id.clone(),
            session_id: session.to_string(),
            pkce_verifier: verifier,
            redirect_uri,
            created_at: Instant::now(),
        },
    );
    debug!(registration = %registration_id, "starting provider login");
    Ok((jar, Redirect::to(url.as_str())))
}

/// Query parameters of a provider callback.
#[derive(Debug, Deserialize)]
pub struct LoginCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET /login/oauth2/code/{registration}`: finish a provider login.
///
/// A successful login moves the session to a fresh id.
pub async fn login_callback_handler(
    State(state): State<AppState>,
    Path(registration_id): Path<String>,
    Query(params): Query<LoginCallbackParams>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    if let Some(error) = params.error {
        warn!(
            registration = %registration_id,
            error = %error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "provider returned an error"
        );
        return Err(AppError::Validation(format!("provider error: {error}")));
    }
    let code = params
        .code
        .ok_or_else(|| AppError::Validation("missing code".into()))?;
    let oauth_state = params
        .state
        .ok_or_else(|| AppError::Validation("missing state".into()))?;

    let pending = state
        .login_states
        .take(&oauth_state)
        .ok_or_else(|| AppError::Validation("unknown or expired state".into()))?;
    if pending.registration_id != registration_id {
        return Err(AppError::Validation("state does not match provider".into()));
    }
    let session = session_id(&jar)
        .filter(|s| s.as_str() == pending.session_id)
        .ok_or_else(|| AppError::Validation("session does not match login".into()))?;

    let registration = state
        .config
        .registration(&registration_id)
        .ok_or_else(|| AppError::NotFound(format!("provider '{registration_id}'")))?
        .clone();

    let authentication = complete_login(&state, &registration, &code, &pending).await?;
    let (jar, session) = rotate_session(jar, state.sessions.as_ref(), &session).await;
    let outcome = state
        .orchestrator
        .on_authentication_success(&authentication, &session)
        .await;
    Ok((jar, Redirect::to(outcome.location())))
}
