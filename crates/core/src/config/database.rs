use serde::{Deserialize, Serialize};

use super::{ConfigValidator, ValidationUtils};
use crate::errors::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/mlpipeline".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> PipelineResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;

        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            return Err(PipelineError::Configuration(
                "database.url must start with postgresql:// or postgres://".to_string(),
            ));
        }

        ValidationUtils::validate_count(self.max_connections as usize, "database.max_connections")?;
        ValidationUtils::validate_count(self.min_connections as usize, "database.min_connections")?;

        if self.min_connections > self.max_connections {
            return Err(PipelineError::Configuration(
                "database.min_connections must be less than or equal to max_connections"
                    .to_string(),
            ));
        }

        ValidationUtils::validate_timeout_seconds(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.idle_timeout_seconds,
            "database.idle_timeout_seconds",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_validation() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.url = "".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.url = "mysql://localhost/db".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.max_connections = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.min_connections = 15;
        invalid.max_connections = 10;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.connection_timeout_seconds = 0;
        assert!(invalid.validate().is_err());
    }
}
