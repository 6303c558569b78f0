use async_trait::async_trait;
use pipeline_core::PipelineResult;
use pipeline_domain::ports::{AuthorizationClient, AuthorizationDecision, ResourceAttributes};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::ClusterClient;

const SUBJECT_ACCESS_REVIEW_PATH: &str = "/apis/authorization.k8s.io/v1/subjectaccessreviews";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectAccessReview<'a> {
    api_version: &'static str,
    kind: &'static str,
    spec: ReviewSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewSpec<'a> {
    user: &'a str,
    resource_attributes: &'a ResourceAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    status: ReviewStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewStatus {
    #[serde(default)]
    allowed: bool,
    #[serde(default)]
    reason: String,
}

/// Asks the API server whether a user may perform an action, through a
/// SubjectAccessReview.
pub struct KubeAuthorizationClient {
    client: ClusterClient,
}

impl KubeAuthorizationClient {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthorizationClient for KubeAuthorizationClient {
    async fn check(
        &self,
        identity: &str,
        attributes: &ResourceAttributes,
    ) -> PipelineResult<AuthorizationDecision> {
        let review = SubjectAccessReview {
            api_version: "authorization.k8s.io/v1",
            kind: "SubjectAccessReview",
            spec: ReviewSpec {
                user: identity,
                resource_attributes: attributes,
            },
        };
        let request = self
            .client
            .request(Method::POST, SUBJECT_ACCESS_REVIEW_PATH)
            .json(&review);
        let response: ReviewResponse = self.client.send_json(request).await?;
        debug!(
            user = identity,
            verb = %attributes.verb,
            resource = %attributes.resource,
            allowed = response.status.allowed,
            "Access review completed"
        );
        Ok(AuthorizationDecision {
            allowed: response.status.allowed,
            reason: response.status.reason,
        })
    }
}
