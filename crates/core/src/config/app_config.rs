use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    cluster::{ClusterConfig, ObjectStoreConfig},
    database::DatabaseConfig,
    manager::ManagerConfig,
    ConfigValidator,
};
use crate::errors::{PipelineError, PipelineResult};

const ENV_PREFIX: &str = "PIPELINES";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cluster: ClusterConfig,
    pub object_store: ObjectStoreConfig,
    pub manager: ManagerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Layers built-in defaults, an optional TOML file and `PIPELINES_*`
    /// environment variables (nested keys separated by `__`).
    pub fn load(config_path: Option<&str>) -> PipelineResult<Self> {
        let mut builder =
            ConfigBuilder::builder().add_source(ConfigBuilder::try_from(&AppConfig::default())?);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(PipelineError::Configuration(format!(
                    "Configuration file does not exist: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/pipelines.toml", "pipelines.toml", "/etc/pipelines/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                debug!(path, "Using configuration file");
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> PipelineResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| PipelineError::Configuration(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Configuration(format!("Failed to serialize TOML: {e}")))
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> PipelineResult<()> {
        self.database.validate()?;
        self.cluster.validate()?;
        self.object_store.validate()?;
        self.manager.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_keeps_manager_flags() {
        let mut config = AppConfig::default();
        config.manager.multi_user_mode = true;
        config.manager.cache_enabled = "false".to_string();
        config
            .manager
            .system_default_parameters
            .insert("pipeline-root".to_string(), "s3://bucket".to_string());

        let parsed = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert!(parsed.manager.multi_user_mode);
        assert_eq!(parsed.manager.cache_enabled, "false");
        assert_eq!(
            parsed.manager.system_default_parameters.get("pipeline-root"),
            Some(&"s3://bucket".to_string())
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://db.internal/pipelines"
max_connections = 4
min_connections = 1
connection_timeout_seconds = 10
idle_timeout_seconds = 60

[cluster]
api_server_url = "https://10.0.0.1:6443"
insecure_skip_tls_verify = true
pod_namespace = "ml"
request_timeout_seconds = 15
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.database.url, "postgres://db.internal/pipelines");
        assert_eq!(config.cluster.pod_namespace, "ml");
        assert_eq!(config.api.bind_address, ApiConfig::default().bind_address);
        assert_eq!(config.manager.archive_page_size, 50);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = AppConfig::load(Some("/nonexistent/pipelines.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
