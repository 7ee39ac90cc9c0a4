//! Session cookie: set, read and clear the httpOnly browser-session cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chain_core::session::{SessionId, SessionStore};
use time::Duration;

/// Cookie name for the browser session.
pub const SESSION_COOKIE: &str = "CHAIN_SESSION";

/// Build the httpOnly session cookie.
pub fn session_cookie(session_id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .build()
}

/// Build an expired cookie to clear the session.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Session id carried by the request, if any.
pub fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value())
        .filter(|v| !v.is_empty())
        .map(|v| SessionId(v.to_string()))
}

/// Session id of the request, creating a new session cookie when the
/// presented one is absent or unknown to the store.
pub async fn ensure_session(
    jar: CookieJar,
    sessions: &dyn SessionStore,
) -> (CookieJar, SessionId) {
    if let Some(id) = session_id(&jar)
        && sessions.contains(&id).await
    {
        return (jar, id);
    }
    let id = SessionId::generate();
    (jar.add(session_cookie(&id)), id)
}

/// Move the session to a fresh id after a login and reissue the cookie.
pub async fn rotate_session(
    jar: CookieJar,
    sessions: &dyn SessionStore,
    session: &SessionId,
) -> (CookieJar, SessionId) {
    let id = sessions.rotate(session).await;
    (jar.add(session_cookie(&id)), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::session::InMemorySessionStore;
    use serde_json::json;

    #[tokio::test]
    async fn ensure_session_reuses_known_session() {
        let store = InMemorySessionStore::new();
        let known = SessionId::generate();
        store.set(&known, "k", json!(1)).await;

        let jar = CookieJar::new().add(session_cookie(&known));
        let (_, id) = ensure_session(jar, &store).await;
        assert_eq!(id, known);
    }

    #[tokio::test]
    async fn ensure_session_replaces_unknown_cookie() {
        let store = InMemorySessionStore::new();
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "attacker-chosen-value"));
        let (jar, id) = ensure_session(jar, &store).await;
        assert_ne!(id.as_str(), "attacker-chosen-value");
        assert_eq!(jar.get(SESSION_COOKIE).unwrap().value(), id.as_str());
    }

    #[tokio::test]
    async fn ensure_session_creates_cookie() {
        let store = InMemorySessionStore::new();
        let (jar, id) = ensure_session(CookieJar::new(), &store).await;
        assert_eq!(jar.get(SESSION_COOKIE).unwrap().value(), id.as_str());
    }

    #[tokio::test]
    async fn rotate_session_reissues_cookie() {
        let store = InMemorySessionStore::new();
        let old = SessionId::generate();
        store.set(&old, "k", json!(1)).await;

        let (jar, new) = rotate_session(CookieJar::new(), &store, &old).await;
        assert_ne!(new, old);
        assert_eq!(jar.get(SESSION_COOKIE).unwrap().value(), new.as_str());
        assert_eq!(store.get(&new, "k").await, Some(json!(1)));
        assert!(!store.contains(&old).await);
    }

    #[test]
    fn empty_cookie_is_no_session() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, ""));
        assert!(session_id(&jar).is_none());
    }
}
