//! Downstream proxy: forwards the filtered request and streams the response.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use tracing::debug;
use url::Url;

use crate::error::GatewayError;
use crate::filter::Upstream;

/// Maximum buffered request body (10 MiB).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn forwardable(headers: &HeaderMap, skip_host: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(name)
            || (skip_host && name == header::HOST)
            || name == header::CONTENT_LENGTH
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Proxies requests to a fixed downstream base URL.
pub struct ProxyUpstream {
    client: reqwest::Client,
    downstream: Url,
}

impl ProxyUpstream {
    pub fn new(downstream: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let downstream = Url::parse(downstream)
            .map_err(|e| GatewayError::InvalidDownstream(format!("{downstream}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("HTTP client init: {e}")))?;
        Ok(Self { client, downstream })
    }

    /// Downstream URL for an inbound path and query.
    fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.downstream.clone();
        let base = self.downstream.path().trim_end_matches('/');
        url.set_path(&format!("{base}{path}"));
        url.set_query(query);
        url
    }

    async fn proxy(&self, request: Request) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let target = self.target_url(parts.uri.path(), parts.uri.query());
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| GatewayError::Body(e.to_string()))?;

        debug!(method = %parts.method, target = %target, "proxying downstream");
        let upstream = self
            .client
            .request(parts.method, target.as_str())
            .headers(forwardable(&parts.headers, true))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Unreachable(e.to_string())
                }
            })?;

        let mut builder = Response::builder().status(upstream.status());
        if let Some(headers) = builder.headers_mut() {
            *headers = forwardable(upstream.headers(), false);
        }
        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| GatewayError::Internal(format!("Response build failed: {e}")))
    }
}

#[async_trait]
impl Upstream for ProxyUpstream {
    async fn forward(&self, request: Request) -> Response {
        match self.proxy(request).await {
            Ok(resp) => resp,
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_joins_base_path_and_query() {
        let up = ProxyUpstream::new("http://localhost:8084/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            up.target_url("/mcp/tools", Some("a=1")).as_str(),
            "http://localhost:8084/api/mcp/tools?a=1"
        );
        let root = ProxyUpstream::new("http://localhost:8084", Duration::from_secs(1)).unwrap();
        assert_eq!(root.target_url("/mcp", None).as_str(), "http://localhost:8084/mcp");
    }

    #[test]
    fn hop_by_hop_and_host_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "gateway".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer x".parse().unwrap());
        let out = forwardable(&headers, true);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer x");
    }

    #[test]
    fn invalid_downstream_is_rejected() {
        assert!(matches!(
            ProxyUpstream::new("not a url", Duration::from_secs(1)),
            Err(GatewayError::InvalidDownstream(_))
        ));
    }
}
