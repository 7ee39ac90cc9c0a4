//! RFC 9728 protected-resource metadata responder.

use async_trait::async_trait;
use axum::Json;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::info;

use super::{GatewayFilter, Next, RESOURCE_METADATA_PATH, request_origin};

/// Answers the exact metadata path; everything else passes through.
pub struct ProtectedResourceMetadataFilter {
    authorization_server: String,
    resource_name: String,
    default_scheme: String,
}

impl ProtectedResourceMetadataFilter {
    pub fn new(
        authorization_server: impl Into<String>,
        resource_name: impl Into<String>,
        default_scheme: impl Into<String>,
    ) -> Self {
        Self {
            authorization_server: authorization_server.into(),
            resource_name: resource_name.into(),
            default_scheme: default_scheme.into(),
        }
    }
}

#[async_trait]
impl GatewayFilter for ProtectedResourceMetadataFilter {
    fn name(&self) -> &'static str {
        "protected-resource-metadata"
    }

    async fn filter(&self, request: Request, next: Next<'_>) -> Response {
        if request.uri().path() != RESOURCE_METADATA_PATH {
            return next.run(request).await;
        }
        let resource = request_origin(&request, &self.default_scheme);
        info!(resource = %resource, "serving protected resource metadata");
        Json(json!({
            "resource": resource,
            "authorization_servers": [self.authorization_server],
            "bearer_methods_supported": ["header"],
            "scopes_supported": ["openid", "profile", "email"],
            "resource_name": self.resource_name,
        }))
        .into_response()
    }
}
