//! Adapter configuration.

use std::time::Duration;

use chain_core::auth::jwt::resolve_jwt_secret;
use chain_core::claims::RelayClaim;
use chain_core::grant::RegisteredClient;
use chain_core::models::ProviderRole;
use chain_core::oauth::ProviderRegistration;

/// Configuration for the auth adapter.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:9000").
    pub bind_addr: String,
    /// Public base URL of the adapter; used as `iss` and for callback URLs.
    pub issuer: String,
    /// HS256 signing secret for issued tokens.
    pub jwt_secret: String,
    pub primary: ProviderRegistration,
    pub secondary: ProviderRegistration,
    /// The downstream client allowed to use the adapter.
    pub client: RegisteredClient,
    pub relay_claim: RelayClaim,
    /// Where to land after a login when no request was saved.
    pub default_success_url: String,
    /// Timeout for calls to the identity providers.
    pub http_timeout: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([' ', ','])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AdapterConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:9000`                          |
    /// | `ISSUER_URI`               | `http://127.0.0.1:9000`                   |
    /// | `PRIMARY_REGISTRATION_ID`  | `test-auth-server`                        |
    /// | `PRIMARY_ISSUER_URI`       | `http://localhost:9001`                   |
    /// | `PRIMARY_CLIENT_ID`        | `auth-adapter`                            |
    /// | `PRIMARY_CLIENT_SECRET`    | `secret`                                  |
    /// | `PRIMARY_SCOPES`           | `openid profile`                          |
    /// | `GITHUB_CLIENT_ID`         | empty                                     |
    /// | `GITHUB_CLIENT_SECRET`     | empty                                     |
    /// | `GITHUB_AUTHORIZATION_URI` | `https://github.com/login/oauth/authorize` |
    /// | `GITHUB_TOKEN_URI`         | `https://github.com/login/oauth/access_token` |
    /// | `GITHUB_USER_INFO_URI`     | `https://api.github.com/user`             |
    /// | `GITHUB_SCOPES`            | `read:user user:email`                    |
    /// | `CLIENT_ID`                | `test-app`                                |
    /// | `CLIENT_SECRET`            | `secret`                                  |
    /// | `CLIENT_REDIRECT_URI`      | `http://127.0.0.1:8080/login/oauth2/code/auth-adapter` |
    /// | `CLIENT_SCOPES`            | `openid profile email read write`         |
    /// | `RELAY_CLAIM`              | `access_token`                            |
    /// | `DEFAULT_SUCCESS_URL`      | `/`                                       |
    /// | `HTTP_TIMEOUT_SECS`        | `10`                                      |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file           |
    ///
    /// Scope and redirect URI lists accept spaces or commas.
    pub fn from_env() -> Self {
        let primary_issuer = env_or("PRIMARY_ISSUER_URI", "http://localhost:9001");
        let primary_issuer = primary_issuer.trim_end_matches('/');

        let primary = ProviderRegistration {
            registration_id: env_or("PRIMARY_REGISTRATION_ID", "test-auth-server"),
            role: ProviderRole::Primary,
            client_id: env_or("PRIMARY_CLIENT_ID", "auth-adapter"),
            client_secret: env_or("PRIMARY_CLIENT_SECRET", "secret"),
            authorization_uri: format!("{primary_issuer}/oauth2/authorize"),
            token_uri: format!("{primary_issuer}/oauth2/token"),
            user_info_uri: format!("{primary_issuer}/userinfo"),
            user_name_attribute: "sub".into(),
            scopes: split_list(&env_or("PRIMARY_SCOPES", "openid profile")),
            oidc: true,
        };

        let secondary = ProviderRegistration {
            registration_id: "github".into(),
            role: ProviderRole::Secondary,
            client_id: env_or("GITHUB_CLIENT_ID", ""),
            client_secret: env_or("GITHUB_CLIENT_SECRET", ""),
            authorization_uri: env_or(
                "GITHUB_AUTHORIZATION_URI",
                "https://github.com/login/oauth/authorize",
            ),
            token_uri: env_or(
                "GITHUB_TOKEN_URI",
                "https://github.com/login/oauth/access_token",
            ),
            user_info_uri: env_or("GITHUB_USER_INFO_URI", "https://api.github.com/user"),
            user_name_attribute: "id".into(),
            scopes: split_list(&env_or("GITHUB_SCOPES", "read:user user:email")),
            oidc: false,
        };

        let client = RegisteredClient {
            client_id: env_or("CLIENT_ID", "test-app"),
            client_secret: env_or("CLIENT_SECRET", "secret"),
            redirect_uris: split_list(&env_or(
                "CLIENT_REDIRECT_URI",
                "http://127.0.0.1:8080/login/oauth2/code/auth-adapter",
            )),
            scopes: split_list(&env_or("CLIENT_SCOPES", "openid profile email read write")),
        };

        let relay_claim = env_or("RELAY_CLAIM", "access_token")
            .parse()
            .unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to access_token relay claim");
                RelayClaim::AccessToken
            });

        let timeout_secs = env_or("HTTP_TIMEOUT_SECS", "10").parse().unwrap_or(10);

        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:9000"),
            issuer: env_or("ISSUER_URI", "http://127.0.0.1:9000")
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: resolve_jwt_secret(),
            primary,
            secondary,
            client,
            relay_claim,
            default_success_url: env_or("DEFAULT_SUCCESS_URL", "/"),
            http_timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Registration for a provider id.
    pub fn registration(&self, registration_id: &str) -> Option<&ProviderRegistration> {
        [&self.primary, &self.secondary]
            .into_iter()
            .find(|r| r.registration_id == registration_id)
    }

    /// Callback URL registered with a provider.
    pub fn callback_url(&self, registration_id: &str) -> String {
        format!("{}/login/oauth2/code/{registration_id}", self.issuer)
    }

    /// Path that starts the login at a provider.
    pub fn login_path(registration_id: &str) -> String {
        format!("/oauth2/authorization/{registration_id}")
    }
}
