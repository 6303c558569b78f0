use async_trait::async_trait;
use pipeline_core::PipelineResult;
use serde_json::Value;

/// Namespaced CRUD over one cluster resource kind.
///
/// `get` and `delete` of a missing object fail with an error whose
/// `is_not_found()` is true; `update` uses the object's resource version for
/// optimistic concurrency and fails with a Conflict error when it is stale.
#[async_trait]
pub trait ClusterResourceClient<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn create(&self, namespace: &str, object: &T) -> PipelineResult<T>;
    async fn get(&self, namespace: &str, name: &str) -> PipelineResult<T>;
    async fn update(&self, namespace: &str, object: &T) -> PipelineResult<T>;
    async fn delete(&self, namespace: &str, name: &str) -> PipelineResult<()>;
    /// JSON merge patch: only the named fields change.
    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> PipelineResult<T>;
}

#[async_trait]
pub trait PodClient: Send + Sync {
    async fn delete_pod(&self, namespace: &str, name: &str) -> PipelineResult<()>;
    async fn read_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        follow: bool,
    ) -> PipelineResult<Vec<u8>>;
}

/// Untyped access to arbitrary custom resources by group/version/plural.
#[async_trait]
pub trait CustomResourceClient: Send + Sync {
    async fn get(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
    ) -> PipelineResult<Value>;
    async fn create(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        body: &Value,
    ) -> PipelineResult<Value>;
    async fn merge_patch(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
        body: &Value,
    ) -> PipelineResult<Value>;
}

/// Receives one call per garbage-collected execution object.
pub trait GcObserver: Send + Sync {
    fn workflow_collected(&self, namespace: &str);
}
