use std::collections::HashMap;

use async_trait::async_trait;
use pipeline_core::PipelineResult;
use serde::{Deserialize, Serialize};

/// Request data visible to identity providers. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// One identity provider. Fails Unauthenticated when it cannot vouch for the
/// request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &RequestContext) -> PipelineResult<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributes {
    pub namespace: String,
    pub verb: String,
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subresource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: String,
}

#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    async fn check(
        &self,
        identity: &str,
        attributes: &ResourceAttributes,
    ) -> PipelineResult<AuthorizationDecision>;
}
