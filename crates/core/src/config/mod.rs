pub mod api_observability;
pub mod app_config;
pub mod cluster;
pub mod database;
pub mod manager;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use cluster::{ClusterConfig, ObjectStoreConfig};
pub use database::DatabaseConfig;
pub use manager::{ManagerConfig, ManagerOptions};

use crate::errors::{PipelineError, PipelineResult};

/// Section-level validation run after deserialization.
pub trait ConfigValidator {
    fn validate(&self) -> PipelineResult<()>;
}

pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field: &str) -> PipelineResult<()> {
        if value.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "{field} must not be empty"
            )));
        }
        Ok(())
    }

    pub fn validate_count(value: usize, field: &str) -> PipelineResult<()> {
        if value == 0 {
            return Err(PipelineError::Configuration(format!(
                "{field} must be greater than 0"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_seconds(value: u64, field: &str) -> PipelineResult<()> {
        if value == 0 || value > 3600 {
            return Err(PipelineError::Configuration(format!(
                "{field} must be between 1 and 3600 seconds"
            )));
        }
        Ok(())
    }

    pub fn validate_http_url(value: &str, field: &str) -> PipelineResult<()> {
        Self::validate_not_empty(value, field)?;
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(PipelineError::Configuration(format!(
                "{field} must start with http:// or https://"
            )));
        }
        Ok(())
    }
}
