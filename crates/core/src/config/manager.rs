use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigValidator, ValidationUtils};
use crate::constants::DEFAULT_SERVICE_ACCOUNT_PLACEHOLDER;
use crate::errors::{PipelineError, PipelineResult};
use crate::retry::ConstantBackoff;

/// Settings that shape how runs and jobs are prepared and reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub multi_user_mode: bool,
    /// Compared case-insensitively against "true"; any other value disables
    /// step caching globally.
    pub cache_enabled: String,
    pub default_service_account: String,
    pub apply_custom_resources: bool,
    pub artifact_bucket: String,
    pub artifact_endpoint: String,
    pub artifact_endpoint_scheme: String,
    pub artifact_image: String,
    pub archive_logs: bool,
    pub track_artifacts: bool,
    pub strip_eof: bool,
    pub inject_default_script: bool,
    /// Shell preamble prepended to every injected archival step.
    pub artifact_script: String,
    /// Optional JSON container used as the base of the archival step.
    pub copy_step_template: Option<String>,
    #[serde(default)]
    pub system_default_parameters: HashMap<String, String>,
    pub patch_retry_interval_ms: u64,
    pub patch_max_retries: u32,
    pub archive_page_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            multi_user_mode: false,
            cache_enabled: "true".to_string(),
            default_service_account: "pipeline-runner".to_string(),
            apply_custom_resources: false,
            artifact_bucket: "mlpipeline".to_string(),
            artifact_endpoint: "minio-service.kubeflow:9000".to_string(),
            artifact_endpoint_scheme: "http://".to_string(),
            artifact_image: "minio/mc:RELEASE.2020-11-25T23-04-07Z".to_string(),
            archive_logs: false,
            track_artifacts: true,
            strip_eof: true,
            inject_default_script: true,
            artifact_script: String::new(),
            copy_step_template: None,
            system_default_parameters: HashMap::new(),
            patch_retry_interval_ms: 100,
            patch_max_retries: 10,
            archive_page_size: 50,
        }
    }
}

impl ConfigValidator for ManagerConfig {
    fn validate(&self) -> PipelineResult<()> {
        ValidationUtils::validate_not_empty(
            &self.default_service_account,
            "manager.default_service_account",
        )?;
        ValidationUtils::validate_not_empty(&self.artifact_image, "manager.artifact_image")?;
        ValidationUtils::validate_count(self.archive_page_size, "manager.archive_page_size")?;

        if let Some(template) = &self.copy_step_template {
            serde_json::from_str::<serde_json::Value>(template).map_err(|e| {
                PipelineError::Configuration(format!(
                    "manager.copy_step_template is not valid JSON: {e}"
                ))
            })?;
        }
        Ok(())
    }
}

impl ManagerConfig {
    pub fn options(&self) -> ManagerOptions {
        ManagerOptions {
            multi_user_mode: self.multi_user_mode,
            cache_enabled: self.cache_enabled.clone(),
            default_service_account: self.default_service_account.clone(),
            apply_custom_resources: self.apply_custom_resources,
            artifact_bucket: self.artifact_bucket.clone(),
            artifact_endpoint: self.artifact_endpoint.clone(),
            artifact_endpoint_scheme: self.artifact_endpoint_scheme.clone(),
            artifact_image: self.artifact_image.clone(),
            archive_logs: self.archive_logs,
            track_artifacts: self.track_artifacts,
            strip_eof: self.strip_eof,
            inject_default_script: self.inject_default_script,
            artifact_script: self.artifact_script.clone(),
            copy_step_template: self
                .copy_step_template
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            system_default_parameters: self.system_default_parameters.clone(),
            patch_backoff: ConstantBackoff::new(
                Duration::from_millis(self.patch_retry_interval_ms),
                self.patch_max_retries,
            ),
            archive_page_size: self.archive_page_size,
        }
    }
}

/// Flags handed explicitly to every mutation and coordinator call.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub multi_user_mode: bool,
    pub cache_enabled: String,
    pub default_service_account: String,
    pub apply_custom_resources: bool,
    pub artifact_bucket: String,
    pub artifact_endpoint: String,
    pub artifact_endpoint_scheme: String,
    pub artifact_image: String,
    pub archive_logs: bool,
    pub track_artifacts: bool,
    pub strip_eof: bool,
    pub inject_default_script: bool,
    pub artifact_script: String,
    pub copy_step_template: Option<serde_json::Value>,
    pub system_default_parameters: HashMap<String, String>,
    pub patch_backoff: ConstantBackoff,
    pub archive_page_size: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        ManagerConfig::default().options()
    }
}

impl ManagerOptions {
    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled == "true"
    }

    /// Service account for a new run: request value, then the template value
    /// unless it is empty or the placeholder, then the configured default.
    pub fn resolve_service_account(&self, requested: &str, from_template: &str) -> String {
        if !requested.is_empty() {
            return requested.to_string();
        }
        if !from_template.is_empty() && from_template != DEFAULT_SERVICE_ACCOUNT_PLACEHOLDER {
            return from_template.to_string();
        }
        self.default_service_account.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_flag_must_be_exactly_true() {
        let mut options = ManagerOptions::default();
        assert!(options.is_cache_enabled());
        options.cache_enabled = "TRUE".to_string();
        assert!(!options.is_cache_enabled());
        options.cache_enabled = "True".to_string();
        assert!(!options.is_cache_enabled());
        options.cache_enabled = "yes".to_string();
        assert!(!options.is_cache_enabled());
        options.cache_enabled = String::new();
        assert!(!options.is_cache_enabled());
    }

    #[test]
    fn test_service_account_resolution_matrix() {
        let options = ManagerOptions {
            default_service_account: "configured-sa".to_string(),
            ..ManagerOptions::default()
        };

        let cases = [
            ("explicit", "", "explicit"),
            ("explicit", DEFAULT_SERVICE_ACCOUNT_PLACEHOLDER, "explicit"),
            ("explicit", "template-sa", "explicit"),
            ("", "", "configured-sa"),
            ("", DEFAULT_SERVICE_ACCOUNT_PLACEHOLDER, "configured-sa"),
            ("", "template-sa", "template-sa"),
        ];
        for (requested, template, expected) in cases {
            assert_eq!(
                options.resolve_service_account(requested, template),
                expected,
                "requested={requested:?} template={template:?}"
            );
        }
    }

    #[test]
    fn test_invalid_copy_step_template_is_rejected() {
        let config = ManagerConfig {
            copy_step_template: Some("{not json".to_string()),
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ManagerConfig {
            copy_step_template: Some(r#"{"name":"archive","image":"busybox"}"#.to_string()),
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.options().copy_step_template.unwrap()["name"],
            "archive"
        );
    }
}
