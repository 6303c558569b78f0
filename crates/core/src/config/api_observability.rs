use serde::{Deserialize, Serialize};

use super::{ConfigValidator, ValidationUtils};
use crate::errors::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_address: String,
    pub request_timeout_seconds: u64,
    pub auth_enabled: bool,
    /// Header carrying the caller identity, e.g. injected by an auth proxy.
    pub user_id_header: String,
    /// Prefix stripped from the header value before it is used as identity.
    pub user_id_prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
            request_timeout_seconds: 30,
            auth_enabled: false,
            user_id_header: "kubeflow-userid".to_string(),
            user_id_prefix: String::new(),
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> PipelineResult<()> {
        ValidationUtils::validate_not_empty(&self.bind_address, "api.bind_address")?;
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "api.request_timeout_seconds",
        )?;
        if self.auth_enabled {
            ValidationUtils::validate_not_empty(&self.user_id_header, "api.user_id_header")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// One of "json", "pretty" or "compact".
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> PipelineResult<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(PipelineError::Configuration(format!(
                    "observability.log_level has unsupported value: {other}"
                )))
            }
        }
        match self.log_format.as_str() {
            "json" | "pretty" | "compact" => {}
            other => {
                return Err(PipelineError::Configuration(format!(
                    "observability.log_format has unsupported value: {other}"
                )))
            }
        }
        if self.metrics_enabled {
            ValidationUtils::validate_not_empty(
                &self.metrics_address,
                "observability.metrics_address",
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_rejects_unknown_format() {
        let mut config = ObservabilityConfig::default();
        assert!(config.validate().is_ok());
        config.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_header_required_only_with_auth() {
        let mut config = ApiConfig {
            user_id_header: String::new(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_ok());
        config.auth_enabled = true;
        assert!(config.validate().is_err());
    }
}
