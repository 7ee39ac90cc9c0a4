//! Gateway configuration.

use std::time::Duration;

/// Configuration for the gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Address to bind the HTTP listener.
    pub bind_addr: String,
    /// Base URL requests are proxied to.
    pub downstream_url: String,
    /// Authorization server advertised in the resource metadata.
    pub authorization_server: String,
    pub resource_name: String,
    /// Scheme used in metadata and challenges when the request carries none.
    pub default_scheme: String,
    /// When set, bearer JWTs must carry a valid HS256 signature.
    pub jwt_secret: Option<String>,
    /// Downstream request timeout.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `GATEWAY_BIND_ADDR`         | `127.0.0.1:8082`        |
    /// | `DOWNSTREAM_URL`            | `http://localhost:8084` |
    /// | `AUTHORIZATION_SERVER_URL`  | `http://127.0.0.1:9000` |
    /// | `RESOURCE_NAME`             | `Gateway Protected Resource` |
    /// | `DEFAULT_SCHEME`            | `http`                  |
    /// | `GATEWAY_JWT_SECRET`        | unset (no signature check) |
    /// | `DOWNSTREAM_TIMEOUT_SECS`   | `30`                    |
    pub fn from_env() -> Self {
        let env_or =
            |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());
        Self {
            bind_addr: env_or("GATEWAY_BIND_ADDR", "127.0.0.1:8082"),
            downstream_url: env_or("DOWNSTREAM_URL", "http://localhost:8084"),
            authorization_server: env_or("AUTHORIZATION_SERVER_URL", "http://127.0.0.1:9000"),
            resource_name: env_or("RESOURCE_NAME", "Gateway Protected Resource"),
            default_scheme: env_or("DEFAULT_SCHEME", "http"),
            jwt_secret: std::env::var("GATEWAY_JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                env_or("DOWNSTREAM_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            ),
        }
    }
}
