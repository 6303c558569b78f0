use async_trait::async_trait;
use pipeline_core::PipelineResult;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> PipelineResult<()>;
    /// Fails NotFound when the key is absent.
    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>>;
    async fn delete(&self, key: &str) -> PipelineResult<()>;
    /// Deterministic key of a pipeline version's template.
    fn pipeline_key(&self, version_id: &str) -> String;
}
