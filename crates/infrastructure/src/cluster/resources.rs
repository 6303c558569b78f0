use std::marker::PhantomData;

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::ports::{ClusterResourceClient, CustomResourceClient};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use super::client::{ClusterClient, MERGE_PATCH_CONTENT_TYPE};
use super::{collection_path, ResourceKind};

/// Typed CRUD over one namespaced resource kind.
pub struct KubeResourceClient<T> {
    client: ClusterClient,
    kind: ResourceKind,
    _object: PhantomData<fn() -> T>,
}

impl<T> KubeResourceClient<T> {
    pub fn new(client: ClusterClient, kind: ResourceKind) -> Self {
        Self {
            client,
            kind,
            _object: PhantomData,
        }
    }
}

/// Reads `metadata.name` from any serializable object.
fn object_name<T: Serialize>(object: &T) -> PipelineResult<String> {
    let value = serde_json::to_value(object)?;
    value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::invalid_input("Object has no metadata.name"))
}

/// A 409 on create means the name is taken, not a stale write.
fn create_error(err: PipelineError, kind: &ResourceKind, name: &str) -> PipelineError {
    match err {
        PipelineError::Conflict(_) => PipelineError::already_exists(kind.plural, name),
        other => other,
    }
}

#[async_trait]
impl<T> ClusterResourceClient<T> for KubeResourceClient<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[instrument(skip(self, object), fields(plural = self.kind.plural))]
    async fn create(&self, namespace: &str, object: &T) -> PipelineResult<T> {
        let request = self
            .client
            .request(Method::POST, &self.kind.collection_path(namespace))
            .json(object);
        self.client.send_json(request).await.map_err(|e| {
            let name = object_name(object).unwrap_or_default();
            create_error(e, &self.kind, &name)
        })
    }

    async fn get(&self, namespace: &str, name: &str) -> PipelineResult<T> {
        let request = self
            .client
            .request(Method::GET, &self.kind.item_path(namespace, name));
        self.client.send_json(request).await
    }

    #[instrument(skip(self, object), fields(plural = self.kind.plural))]
    async fn update(&self, namespace: &str, object: &T) -> PipelineResult<T> {
        let name = object_name(object)?;
        let request = self
            .client
            .request(Method::PUT, &self.kind.item_path(namespace, &name))
            .json(object);
        self.client.send_json(request).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> PipelineResult<()> {
        let request = self
            .client
            .request(Method::DELETE, &self.kind.item_path(namespace, name));
        self.client.send_empty(request).await
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> PipelineResult<T> {
        let request = self
            .client
            .request(Method::PATCH, &self.kind.item_path(namespace, name))
            .header(CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .body(patch.to_string());
        self.client.send_json(request).await
    }
}

/// Untyped access for the custom resources a pipeline may declare.
pub struct KubeCustomResourceClient {
    client: ClusterClient,
}

impl KubeCustomResourceClient {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CustomResourceClient for KubeCustomResourceClient {
    async fn get(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
    ) -> PipelineResult<Value> {
        let path = format!("{}/{}", collection_path(group, version, namespace, plural), name);
        let request = self.client.request(Method::GET, &path);
        self.client.send_json(request).await
    }

    async fn create(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        body: &Value,
    ) -> PipelineResult<Value> {
        let path = collection_path(group, version, namespace, plural);
        let request = self.client.request(Method::POST, &path).json(body);
        self.client.send_json(request).await
    }

    async fn merge_patch(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
        body: &Value,
    ) -> PipelineResult<Value> {
        let path = format!("{}/{}", collection_path(group, version, namespace, plural), name);
        let request = self
            .client
            .request(Method::PATCH, &path)
            .header(CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .body(body.to_string());
        self.client.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_name_requires_metadata_name() {
        assert_eq!(
            object_name(&json!({"metadata": {"name": "wf-1"}})).unwrap(),
            "wf-1"
        );
        assert!(object_name(&json!({"metadata": {"generateName": "wf-"}})).is_err());
    }

    #[test]
    fn test_create_conflict_becomes_already_exists() {
        let err = create_error(
            PipelineError::Conflict("exists".into()),
            &ResourceKind::WORKFLOWS,
            "wf-1",
        );
        assert!(matches!(err, PipelineError::AlreadyExists { ref id, .. } if id == "wf-1"));
    }
}
