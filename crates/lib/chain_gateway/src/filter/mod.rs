//! Ordered request filters applied before proxying.
//!
//! Each filter either answers the request itself or hands it, possibly
//! modified, to the rest of the chain through [`Next`].

pub mod auth_required;
pub mod bearer;
pub mod metadata;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::header::HOST;
use axum::response::Response;

/// Path of the RFC 9728 protected-resource metadata document.
pub const RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// One step of the gateway pipeline.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn filter(&self, request: Request, next: Next<'_>) -> Response;
}

/// Terminal stage the chain hands requests to.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: Request) -> Response;
}

/// The remainder of the chain after the current filter.
pub struct Next<'a> {
    filters: &'a [Arc<dyn GatewayFilter>],
    upstream: &'a dyn Upstream,
}

impl Next<'_> {
    pub async fn run(self, request: Request) -> Response {
        match self.filters.split_first() {
            Some((filter, rest)) => {
                tracing::trace!(filter = filter.name(), "running gateway filter");
                filter
                    .filter(
                        request,
                        Next {
                            filters: rest,
                            upstream: self.upstream,
                        },
                    )
                    .await
            }
            None => self.upstream.forward(request).await,
        }
    }
}

/// Filters composed at startup in front of an upstream.
pub struct FilterChain {
    filters: Vec<Arc<dyn GatewayFilter>>,
    upstream: Arc<dyn Upstream>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn GatewayFilter>>, upstream: Arc<dyn Upstream>) -> Self {
        Self { filters, upstream }
    }

    pub async fn handle(&self, request: Request) -> Response {
        Next {
            filters: &self.filters,
            upstream: self.upstream.as_ref(),
        }
        .run(request)
        .await
    }
}

/// `scheme://host[:port]` the client used to reach the gateway.
///
/// Scheme comes from the request URI, then `X-Forwarded-Proto`, then
/// `default_scheme`. Host comes from the URI authority, then `Host`.
pub fn request_origin(request: &Request, default_scheme: &str) -> String {
    let headers = request.headers();
    let scheme = request
        .uri()
        .scheme_str()
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
        })
        .unwrap_or_else(|| default_scheme.to_string());
    let host = request
        .uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());
    format!("{scheme}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn origin_from_absolute_uri() {
        let req = axum::http::Request::builder()
            .uri("https://api.example.com:8443/mcp")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_origin(&req, "http"), "https://api.example.com:8443");
    }

    #[test]
    fn origin_from_host_header_and_forwarded_proto() {
        let req = axum::http::Request::builder()
            .uri("/mcp")
            .header(HOST, "gateway.local:8082")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_origin(&req, "http"), "https://gateway.local:8082");
    }

    #[test]
    fn origin_defaults_scheme() {
        let req = axum::http::Request::builder()
            .uri("/mcp")
            .header(HOST, "localhost:8082")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_origin(&req, "http"), "http://localhost:8082");
    }
}
