//! `POST /logout`

use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use crate::AppState;
use crate::services::cookies::{clear_session_cookie, session_id};

/// Drop the browser session, chain state included, and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if let Some(session) = session_id(&jar) {
        state.sessions.invalidate(&session).await;
        info!("session invalidated");
    }
    (jar.add(clear_session_cookie()), StatusCode::NO_CONTENT)
}
