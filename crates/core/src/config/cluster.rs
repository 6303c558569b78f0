use serde::{Deserialize, Serialize};

use super::{ConfigValidator, ValidationUtils};
use crate::errors::PipelineResult;

/// Connection to the cluster API server hosting the execution resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub api_server_url: String,
    /// Service-account token mounted into the pod; read once at start-up.
    pub token_path: Option<String>,
    pub insecure_skip_tls_verify: bool,
    /// Namespace the service itself runs in. Used in single-user mode.
    pub pod_namespace: String,
    pub request_timeout_seconds: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server_url: "https://kubernetes.default.svc".to_string(),
            token_path: Some("/var/run/secrets/kubernetes.io/serviceaccount/token".to_string()),
            insecure_skip_tls_verify: false,
            pod_namespace: "kubeflow".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for ClusterConfig {
    fn validate(&self) -> PipelineResult<()> {
        ValidationUtils::validate_http_url(&self.api_server_url, "cluster.api_server_url")?;
        ValidationUtils::validate_not_empty(&self.pod_namespace, "cluster.pod_namespace")?;
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "cluster.request_timeout_seconds",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub root_dir: String,
    pub pipeline_prefix: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: "/var/lib/pipelines/objects".to_string(),
            pipeline_prefix: "pipelines".to_string(),
        }
    }
}

impl ConfigValidator for ObjectStoreConfig {
    fn validate(&self) -> PipelineResult<()> {
        ValidationUtils::validate_not_empty(&self.root_dir, "object_store.root_dir")?;
        ValidationUtils::validate_not_empty(&self.pipeline_prefix, "object_store.pipeline_prefix")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_config_requires_http_url() {
        let mut config = ClusterConfig::default();
        assert!(config.validate().is_ok());

        config.api_server_url = "kubernetes.default.svc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_object_store_config_rejects_empty_root() {
        let config = ObjectStoreConfig {
            root_dir: " ".to_string(),
            ..ObjectStoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
