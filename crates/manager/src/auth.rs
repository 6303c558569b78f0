//! Request authentication and authorization.

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::ports::{Authenticator, RequestContext, ResourceAttributes};
use tracing::{debug, instrument};

use crate::ResourceManager;

/// Trusts an identity header set by an authenticating proxy in front of the
/// API server.
#[derive(Debug, Clone)]
pub struct HeaderAuthenticator {
    header: String,
    prefix: String,
}

impl HeaderAuthenticator {
    pub fn new(header: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, request: &RequestContext) -> PipelineResult<String> {
        let value = request.header(&self.header).ok_or_else(|| {
            PipelineError::Unauthenticated(format!("Request header '{}' missing", self.header))
        })?;
        let identity = value.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
            PipelineError::Unauthenticated(format!(
                "Header '{}' is incorrectly formatted: expected prefix '{}'",
                self.header, self.prefix
            ))
        })?;
        if identity.is_empty() {
            return Err(PipelineError::Unauthenticated(format!(
                "Header '{}' carries an empty identity",
                self.header
            )));
        }
        Ok(identity.to_string())
    }
}

impl ResourceManager {
    /// Tries each configured identity provider in order. When all of them
    /// fail, their errors are returned together.
    pub async fn authenticate_request(&self, request: &RequestContext) -> PipelineResult<String> {
        let mut errors = Vec::new();
        for authenticator in &self.clients.authenticators {
            match authenticator.authenticate(request).await {
                Ok(identity) => return Ok(identity),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            return Err(PipelineError::Unauthenticated(
                "No identity provider is configured".to_string(),
            ));
        }
        Err(PipelineError::Aggregate(errors))
    }

    #[instrument(skip(self, request, attributes), fields(verb = %attributes.verb, resource = %attributes.resource, namespace = %attributes.namespace))]
    pub async fn is_request_authorized(
        &self,
        request: &RequestContext,
        attributes: &ResourceAttributes,
    ) -> PipelineResult<()> {
        let identity = self.authenticate_request(request).await?;
        let decision = self
            .clients
            .authorizer
            .check(&identity, attributes)
            .await
            .map_err(|e| {
                PipelineError::internal(
                    e,
                    format!("Authorization check failed for user '{identity}'"),
                )
            })?;
        if !decision.allowed {
            return Err(PipelineError::PermissionDenied(format!(
                "User '{identity}' is not authorized with reason: {} (request: {} {}/{} in namespace {})",
                decision.reason,
                attributes.verb,
                attributes.resource,
                attributes.name,
                attributes.namespace
            )));
        }
        debug!(identity = %identity, "Request authorized");
        Ok(())
    }
}
