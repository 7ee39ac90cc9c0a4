//! `POST /oauth2/token`

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use base64::Engine;
use chain_core::grant::GrantError;
use chain_core::grant::server::CodeExchange;
use serde::Deserialize;

use crate::AppState;
use crate::error::AppResult;

/// Form body of a token request.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Client credentials from `client_secret_basic`, else `client_secret_post`.
fn client_credentials(headers: &HeaderMap, form: &TokenForm) -> Result<(String, String), GrantError> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        && let Some(encoded) = value.strip_prefix("Basic ")
    {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| GrantError::InvalidClient("malformed basic credentials".into()))?;
        let (id, secret) = decoded
            .split_once(':')
            .ok_or_else(|| GrantError::InvalidClient("malformed basic credentials".into()))?;
        return Ok((id.to_string(), secret.to_string()));
    }
    match (&form.client_id, &form.client_secret) {
        (Some(id), Some(secret)) => Ok((id.clone(), secret.clone())),
        _ => Err(GrantError::InvalidClient("client authentication required".into())),
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, GrantError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GrantError::InvalidRequest(format!("missing {name}")))
}

/// Exchange a code or refresh token for an access token.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> AppResult<Response> {
    let (client_id, client_secret) = client_credentials(&headers, &form)?;

    let tokens = match form.grant_type.as_str() {
        "authorization_code" => {
            state
                .server
                .exchange_code(CodeExchange {
                    client_id,
                    client_secret,
                    code: required(form.code, "code")?,
                    redirect_uri: form.redirect_uri,
                    code_verifier: form.code_verifier,
                })
                .await?
        }
        "refresh_token" => {
            let refresh_token = required(form.refresh_token, "refresh_token")?;
            state
                .server
                .refresh(&client_id, &client_secret, &refresh_token)
                .await?
        }
        other => {
            return Err(GrantError::UnsupportedGrantType(format!(
                "grant_type '{other}' is not supported"
            ))
            .into());
        }
    };

    let mut resp = Json(tokens).into_response();
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(client_id: Option<&str>, client_secret: Option<&str>) -> TokenForm {
        TokenForm {
            grant_type: "authorization_code".into(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: None,
            client_id: client_id.map(str::to_string),
            client_secret: client_secret.map(str::to_string),
        }
    }

    #[test]
    fn basic_credentials_take_precedence() {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("test-app:secret");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let (id, secret) =
            client_credentials(&headers, &form(Some("other"), Some("x"))).unwrap();
        assert_eq!((id.as_str(), secret.as_str()), ("test-app", "secret"));
    }

    #[test]
    fn post_credentials_used_without_header() {
        let (id, _) =
            client_credentials(&HeaderMap::new(), &form(Some("test-app"), Some("secret"))).unwrap();
        assert_eq!(id, "test-app");
    }

    #[test]
    fn missing_credentials_is_invalid_client() {
        assert!(matches!(
            client_credentials(&HeaderMap::new(), &form(Some("test-app"), None)),
            Err(GrantError::InvalidClient(_))
        ));
    }
}
