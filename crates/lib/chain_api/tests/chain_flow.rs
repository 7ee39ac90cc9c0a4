//! End-to-end chain: primary login, secondary login, code, token.
//!
//! Both identity providers are served by one mock axum app on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use chain_api::config::AdapterConfig;
use chain_api::{AppState, router};
use chain_core::auth::jwt::verify_signature;
use chain_core::authorization::InMemoryAuthorizationStore;
use chain_core::claims::RelayClaim;
use chain_core::grant::RegisteredClient;
use chain_core::models::ProviderRole;
use chain_core::oauth::{OAuthStateStore, ProviderRegistration, compute_code_challenge};
use chain_core::session::InMemorySessionStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret-0123456789";
const CLIENT_REDIRECT: &str = "http://127.0.0.1:8080/login/oauth2/code/auth-adapter";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

async fn spawn_mock_idp() -> String {
    let app = Router::new()
        .route(
            "/primary/token",
            post(|| async {
                Json(json!({
                    "access_token": "primary-at",
                    "token_type": "Bearer",
                    "expires_in": 300,
                    "scope": "openid profile"
                }))
            }),
        )
        .route(
            "/primary/userinfo",
            get(|| async {
                Json(json!({"sub": "user-1", "preferred_username": "alice", "name": "Alice"}))
            }),
        )
        .route(
            "/github/token",
            post(|| async {
                Json(json!({
                    "access_token": "gho_mock",
                    "token_type": "bearer",
                    "scope": "read:user"
                }))
            }),
        )
        .route(
            "/github/user",
            get(|| async {
                Json(json!({
                    "id": 42,
                    "login": "octocat",
                    "name": "The Octocat",
                    "email": null,
                    "avatar_url": "https://avatars.example/u/42"
                }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn config(idp: &str) -> AdapterConfig {
    AdapterConfig {
        bind_addr: "127.0.0.1:0".into(),
        issuer: "http://127.0.0.1:9000".into(),
        jwt_secret: SECRET.into(),
        primary: ProviderRegistration {
            registration_id: "test-auth-server".into(),
            role: ProviderRole::Primary,
            client_id: "auth-adapter".into(),
            client_secret: "secret".into(),
            authorization_uri: format!("{idp}/primary/authorize"),
            token_uri: format!("{idp}/primary/token"),
            user_info_uri: format!("{idp}/primary/userinfo"),
            user_name_attribute: "sub".into(),
            scopes: vec!["openid".into(), "profile".into()],
            oidc: true,
        },
        secondary: ProviderRegistration {
            registration_id: "github".into(),
            role: ProviderRole::Secondary,
            client_id: "gh-client".into(),
            client_secret: "gh-secret".into(),
            authorization_uri: format!("{idp}/github/authorize"),
            token_uri: format!("{idp}/github/token"),
            user_info_uri: format!("{idp}/github/user"),
            user_name_attribute: "id".into(),
            scopes: vec!["read:user".into()],
            oidc: false,
        },
        client: RegisteredClient {
            client_id: "test-app".into(),
            client_secret: "secret".into(),
            redirect_uris: vec![CLIENT_REDIRECT.into()],
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
        },
        relay_claim: RelayClaim::AccessToken,
        default_success_url: "/".into(),
        http_timeout: Duration::from_secs(5),
    }
}

fn app(idp: &str) -> Router {
    let state = AppState::new(
        config(idp),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryAuthorizationStore::new()),
        Arc::new(OAuthStateStore::new()),
    )
    .unwrap();
    router(state)
}

async fn get_with_cookie(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut req = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn location(resp: &Response<Body>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn authorize_uri() -> String {
    let challenge = compute_code_challenge(VERIFIER);
    let mut url = url::Url::parse("http://adapter/oauth2/authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", "test-app")
        .append_pair("redirect_uri", CLIENT_REDIRECT)
        .append_pair("scope", "openid profile")
        .append_pair("state", "client-state")
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256");
    format!("/oauth2/authorize?{}", url.query().unwrap())
}

/// `name=value` of the session cookie set by a response, if any.
fn session_cookie(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
}

/// Drive a provider login from its start path to the callback redirect.
///
/// Returns the redirect and the rotated session cookie.
async fn provider_login(
    app: &Router,
    start: &str,
    cookie: &str,
    code: &str,
) -> (String, String) {
    let resp = get_with_cookie(app, start, Some(cookie)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(session_cookie(&resp).is_none(), "known session is kept at login start");
    let state = query_param(&location(&resp), "state").expect("state param");
    let registration = start.rsplit('/').next().unwrap();
    let callback = format!("/login/oauth2/code/{registration}?code={code}&state={state}");
    let resp = get_with_cookie(app, &callback, Some(cookie)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "callback for {registration}");
    let rotated = session_cookie(&resp).expect("rotated session cookie");
    assert_ne!(rotated, cookie);
    (location(&resp), rotated)
}

async fn body_json(resp: Response<Body>) -> Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn full_chain_issues_merged_token() {
    let idp = spawn_mock_idp().await;
    let app = app(&idp);

    // Unauthenticated authorize: saved and sent to the primary provider.
    let resp = get_with_cookie(&app, &authorize_uri(), None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/oauth2/authorization/test-auth-server");
    let cookie = session_cookie(&resp).expect("session cookie");

    let (next, cookie) = provider_login(
        &app,
        "/oauth2/authorization/test-auth-server",
        &cookie,
        "primary-code",
    )
    .await;
    assert_eq!(next, "/oauth2/authorization/github");

    let (next, cookie) = provider_login(&app, &next, &cookie, "gh-code").await;
    assert_eq!(next, authorize_uri());

    let resp = get_with_cookie(&app, &next, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let redirect = location(&resp);
    assert!(redirect.starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("client-state"));
    let code = query_param(&redirect, "code").expect("code");

    let basic = base64::engine::general_purpose::STANDARD.encode("test-app:secret");
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", &code)
        .append_pair("redirect_uri", CLIENT_REDIRECT)
        .append_pair("code_verifier", VERIFIER)
        .finish();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth2/token")
                .header(header::AUTHORIZATION, format!("Basic {basic}"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let tokens = body_json(resp).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["refresh_token"].is_string());

    let claims = verify_signature(tokens["access_token"].as_str().unwrap(), SECRET.as_bytes())
        .unwrap();
    assert_eq!(claims["sub"], "user-1");
    assert_eq!(claims["test_auth_server_sub"], "user-1");
    assert_eq!(claims["preferred_username"], "alice");
    assert_eq!(claims["github_login"], "octocat");
    assert_eq!(claims["github_id"], 42);
    assert_eq!(claims["access_token"], "gho_mock");
    assert!(claims.get("github_email").is_none());
}

#[tokio::test]
async fn unknown_session_cookie_is_replaced() {
    let app = app("http://127.0.0.1:1");
    let resp = get_with_cookie(
        &app,
        &authorize_uri(),
        Some("CHAIN_SESSION=attacker-chosen-value"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/oauth2/authorization/test-auth-server");
    let issued = session_cookie(&resp).expect("fresh session cookie");
    assert!(issued.starts_with("CHAIN_SESSION="));
    assert_ne!(issued, "CHAIN_SESSION=attacker-chosen-value");
}

#[tokio::test]
async fn planted_session_is_not_authenticated_by_victim_login() {
    let idp = spawn_mock_idp().await;
    let app = app(&idp);

    // A session id the server did issue, handed to the victim's browser.
    let resp = get_with_cookie(&app, &authorize_uri(), None).await;
    let planted = session_cookie(&resp).expect("session cookie");

    let (next, cookie) = provider_login(
        &app,
        "/oauth2/authorization/test-auth-server",
        &planted,
        "primary-code",
    )
    .await;
    let (_, cookie) = provider_login(&app, &next, &cookie, "gh-code").await;

    let resp = get_with_cookie(&app, &authorize_uri(), Some(&cookie)).await;
    assert!(location(&resp).starts_with(CLIENT_REDIRECT));

    let resp = get_with_cookie(&app, &authorize_uri(), Some(&planted)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/oauth2/authorization/test-auth-server");
}

#[tokio::test]
async fn unknown_client_is_rejected_without_redirect() {
    let app = app("http://127.0.0.1:1");
    let resp = get_with_cookie(
        &app,
        "/oauth2/authorize?response_type=code&client_id=nope&redirect_uri=http%3A%2F%2Fevil.example%2Fcb",
        None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_request");
}

#[tokio::test]
async fn callback_with_unknown_state_is_rejected() {
    let app = app("http://127.0.0.1:1");
    let resp = get_with_cookie(
        &app,
        "/login/oauth2/code/github?code=x&state=forged",
        Some("CHAIN_SESSION=abc"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_grant_type() {
    let app = app("http://127.0.0.1:1");
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth2/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "grant_type=password&client_id=test-app&client_secret=secret",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn metadata_lists_endpoints() {
    let app = app("http://127.0.0.1:1");
    let resp = get_with_cookie(&app, "/.well-known/oauth-authorization-server", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["issuer"], "http://127.0.0.1:9000");
    assert_eq!(json["token_endpoint"], "http://127.0.0.1:9000/oauth2/token");
    assert_eq!(json["code_challenge_methods_supported"], json!(["S256"]));
}

#[tokio::test]
async fn logout_clears_session_cookie() {
    let app = app("http://127.0.0.1:1");
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::COOKIE, "CHAIN_SESSION=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("CHAIN_SESSION=;"));
}
