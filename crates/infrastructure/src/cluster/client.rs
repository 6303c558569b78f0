use std::time::Duration;

use pipeline_core::config::ClusterConfig;
use pipeline_core::{PipelineError, PipelineResult};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

pub(crate) const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

/// Thin REST client for the cluster API server. Cheap to clone; every typed
/// client shares one connection pool.
#[derive(Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ClusterClient {
    pub fn new(config: &ClusterConfig) -> PipelineResult<Self> {
        let token = match &config.token_path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(token) => Some(token.trim().to_string()),
                Err(e) => {
                    warn!(token_path = %path, error = %e, "Service account token not readable, calling the API server anonymously");
                    None
                }
            },
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()
            .map_err(|e| PipelineError::internal(e, "Failed to build cluster HTTP client"))?;

        info!(
            api_server = %config.api_server_url,
            authenticated = token.is_some(),
            "Cluster client initialized"
        );
        Ok(Self {
            http,
            base_url: config.api_server_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "Cluster API request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> PipelineResult<T> {
        let response = Self::send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::Serialization(format!("Invalid cluster API response: {e}")))
    }

    pub(crate) async fn send_bytes(&self, builder: RequestBuilder) -> PipelineResult<Vec<u8>> {
        let response = Self::send(builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::internal(e, "Failed to read cluster API response"))?;
        Ok(bytes.to_vec())
    }

    pub(crate) async fn send_empty(&self, builder: RequestBuilder) -> PipelineResult<()> {
        Self::send(builder).await.map(|_| ())
    }

    async fn send(builder: RequestBuilder) -> PipelineResult<Response> {
        let response = builder.send().await.map_err(|e| PipelineError::ClusterApi {
            status: e.status().map(|s| s.as_u16()).unwrap_or(503),
            message: format!("Cluster API unreachable: {e}"),
        })?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

/// Maps a failed API server response onto the error taxonomy. The body is a
/// `Status` object whose `message` is preferred when present.
pub(crate) fn status_error(status: StatusCode, body: &str) -> PipelineError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    match status {
        StatusCode::CONFLICT => PipelineError::Conflict(message),
        StatusCode::UNAUTHORIZED => PipelineError::Unauthenticated(message),
        StatusCode::FORBIDDEN => PipelineError::PermissionDenied(message),
        _ => PipelineError::ClusterApi {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::ErrorKind;

    #[test]
    fn test_status_error_prefers_status_message() {
        let err = status_error(
            StatusCode::NOT_FOUND,
            r#"{"kind":"Status","message":"pipelineruns \"wf\" not found","code":404}"#,
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("pipelineruns \"wf\" not found"));
    }

    #[test]
    fn test_status_error_classification() {
        assert_eq!(
            status_error(StatusCode::CONFLICT, "stale").kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, "").kind(),
            ErrorKind::PermissionDenied
        );
        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE, "try later");
        assert!(unavailable.is_retryable());
        assert!(unavailable.to_string().contains("try later"));
    }

    #[test]
    fn test_missing_token_file_is_tolerated() {
        let config = ClusterConfig {
            token_path: Some("/nonexistent/token".to_string()),
            ..ClusterConfig::default()
        };
        let client = ClusterClient::new(&config).unwrap();
        assert!(client.token.is_none());
        assert_eq!(client.base_url, "https://kubernetes.default.svc");
    }
}
