use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use pipeline_core::config::ObjectStoreConfig;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::ports::ObjectStore;
use tokio::fs;
use tracing::debug;

/// Blob store backed by a local or mounted directory. Keys are relative
/// paths under the root.
pub struct FileObjectStore {
    root: PathBuf,
    pipeline_prefix: String,
}

impl FileObjectStore {
    pub fn new(config: &ObjectStoreConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root_dir),
            pipeline_prefix: config.pipeline_prefix.trim_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> PipelineResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(PipelineError::invalid_input(format!(
                "Invalid object key: {key:?}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> PipelineResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::internal(e, format!("Failed to create directory for {key}")))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::internal(e, format!("Failed to write object {key}")))?;
        debug!(key, size = bytes.len(), "Object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(PipelineError::not_found("object", key)),
            Err(e) => Err(PipelineError::internal(e, format!("Failed to read object {key}"))),
        }
    }

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> PipelineResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::internal(e, format!("Failed to delete object {key}"))),
        }
    }

    fn pipeline_key(&self, version_id: &str) -> String {
        format!("{}/{}", self.pipeline_prefix, version_id)
    }
}
