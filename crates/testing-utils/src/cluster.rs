//! Fake cluster, blob store and identity collaborators.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::ports::{
    AuthorizationClient, AuthorizationDecision, Authenticator, ClusterResourceClient,
    CustomResourceClient, GcObserver, LogArchive, ObjectStore, PodClient, RequestContext,
    ResourceAttributes,
};
use pipeline_domain::Workflow;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::helpers::merge_patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterOp {
    Create,
    Get,
    Update,
    Delete,
    Patch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCall {
    pub op: ClusterOp,
    pub namespace: String,
    pub name: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: ClusterOp,
    name: Option<String>,
    status: u16,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct ClusterState {
    objects: HashMap<(String, String), Value>,
    calls: Vec<ClusterCall>,
    failures: Vec<FailureRule>,
    next_uid: usize,
}

/// In-memory stand-in for one namespaced custom-resource kind.
///
/// Objects are kept as JSON so merge patches and resource versions behave
/// the way the API server applies them.
pub struct FakeClusterClient<T> {
    state: Arc<Mutex<ClusterState>>,
    uid_prefix: String,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for FakeClusterClient<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            uid_prefix: self.uid_prefix.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T> Default for FakeClusterClient<T> {
    fn default() -> Self {
        Self::new("uid")
    }
}

impl<T> FakeClusterClient<T> {
    pub fn new(uid_prefix: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState::default())),
            uid_prefix: uid_prefix.to_string(),
            _kind: PhantomData,
        }
    }

    /// Stores an object as if another actor had created it.
    pub fn seed(&self, namespace: &str, object: Value) {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        state.objects.insert((namespace.to_string(), name), object);
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, op: ClusterOp) -> Vec<ClusterCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Fails `op` with the given HTTP status. `name` narrows the rule to one
    /// object and `times` bounds how often it fires.
    pub fn fail(&self, op: ClusterOp, name: Option<&str>, status: u16, times: Option<usize>) {
        self.state.lock().unwrap().failures.push(FailureRule {
            op,
            name: name.map(str::to_string),
            status,
            remaining: times,
        });
    }
}

fn status_error(status: u16, op: ClusterOp, name: &str) -> PipelineError {
    match status {
        404 => PipelineError::not_found("object", name),
        409 => PipelineError::Conflict(format!("injected conflict on {op:?} {name}")),
        _ => PipelineError::ClusterApi {
            status,
            message: format!("injected failure on {op:?} {name}"),
        },
    }
}

impl ClusterState {
    fn record(&mut self, op: ClusterOp, namespace: &str, name: &str, body: Option<Value>) -> PipelineResult<()> {
        self.calls.push(ClusterCall {
            op,
            namespace: namespace.to_string(),
            name: name.to_string(),
            body,
        });
        let rule = self.failures.iter_mut().find(|r| {
            r.op == op
                && r.name.as_deref().map_or(true, |n| n == name)
                && r.remaining != Some(0)
        });
        if let Some(rule) = rule {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(status_error(rule.status, op, name));
        }
        Ok(())
    }

    fn existing(&self, namespace: &str, name: &str) -> PipelineResult<&Value> {
        self.objects
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| PipelineError::not_found("object", name))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> PipelineResult<T> {
    Ok(serde_json::from_value(value)?)
}

fn bump_version(object: &mut Value) {
    let version = object["metadata"]["resourceVersion"]
        .as_str()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    object["metadata"]["resourceVersion"] = json!((version + 1).to_string());
}

#[async_trait]
impl<T> ClusterResourceClient<T> for FakeClusterClient<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn create(&self, namespace: &str, object: &T) -> PipelineResult<T> {
        let mut value = serde_json::to_value(object)?;
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let n = state.next_uid;

        let mut name = value["metadata"]["name"].as_str().unwrap_or_default().to_string();
        if name.is_empty() {
            let prefix = value["metadata"]["generateName"].as_str().unwrap_or("object-");
            name = format!("{prefix}{n:05}");
        }
        state.record(ClusterOp::Create, namespace, &name, Some(value.clone()))?;
        if state.existing(namespace, &name).is_ok() {
            return Err(PipelineError::already_exists("object", &name));
        }

        let metadata = &mut value["metadata"];
        metadata["name"] = json!(name);
        metadata["namespace"] = json!(namespace);
        metadata["uid"] = json!(format!("{}-{n}", self.uid_prefix));
        metadata["resourceVersion"] = json!("1");
        metadata["creationTimestamp"] = json!("2024-03-01T12:00:00Z");
        state
            .objects
            .insert((namespace.to_string(), name), value.clone());
        decode(value)
    }

    async fn get(&self, namespace: &str, name: &str) -> PipelineResult<T> {
        let mut state = self.state.lock().unwrap();
        state.record(ClusterOp::Get, namespace, name, None)?;
        decode(state.existing(namespace, name)?.clone())
    }

    async fn update(&self, namespace: &str, object: &T) -> PipelineResult<T> {
        let mut value = serde_json::to_value(object)?;
        let name = value["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        state.record(ClusterOp::Update, namespace, &name, Some(value.clone()))?;
        let current = state.existing(namespace, &name)?;
        if current["metadata"]["resourceVersion"] != value["metadata"]["resourceVersion"] {
            return Err(PipelineError::Conflict(format!(
                "the object {name} has been modified; resource version is stale"
            )));
        }
        value["metadata"]["uid"] = current["metadata"]["uid"].clone();
        bump_version(&mut value);
        state
            .objects
            .insert((namespace.to_string(), name), value.clone());
        decode(value)
    }

    async fn delete(&self, namespace: &str, name: &str) -> PipelineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(ClusterOp::Delete, namespace, name, None)?;
        state
            .objects
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| PipelineError::not_found("object", name))
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> PipelineResult<T> {
        let mut state = self.state.lock().unwrap();
        state.record(ClusterOp::Patch, namespace, name, Some(patch.clone()))?;
        let mut current = state.existing(namespace, name)?.clone();
        merge_patch(&mut current, patch);
        bump_version(&mut current);
        state
            .objects
            .insert((namespace.to_string(), name.to_string()), current.clone());
        decode(current)
    }
}

/// Pods with canned logs. Deleted pod names are recorded.
#[derive(Debug, Clone, Default)]
pub struct FakePodClient {
    logs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
}

impl FakePodClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(&self, pod: &str, log: &str) {
        self.logs
            .lock()
            .unwrap()
            .insert(pod.to_string(), log.as_bytes().to_vec());
    }

    pub fn fail_delete(&self, pod: &str) {
        self.failing_deletes.lock().unwrap().insert(pod.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PodClient for FakePodClient {
    async fn delete_pod(&self, _namespace: &str, name: &str) -> PipelineResult<()> {
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(PipelineError::ClusterApi {
                status: 500,
                message: format!("cannot delete pod {name}"),
            });
        }
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn read_log(
        &self,
        _namespace: &str,
        pod: &str,
        _container: &str,
        _follow: bool,
    ) -> PipelineResult<Vec<u8>> {
        self.logs
            .lock()
            .unwrap()
            .get(pod)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("pod", pod))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CustomResourceCall {
    Get(String),
    Create(String),
    MergePatch(String),
}

/// Untyped custom resources keyed by `group/version/namespace/plural/name`.
#[derive(Debug, Clone, Default)]
pub struct FakeCustomResourceClient {
    objects: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<Vec<CustomResourceCall>>>,
}

fn resource_key(group: &str, version: &str, namespace: &str, plural: &str, name: &str) -> String {
    format!("{group}/{version}/{namespace}/{plural}/{name}")
}

impl FakeCustomResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CustomResourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn object(&self, key: &str) -> Option<Value> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl CustomResourceClient for FakeCustomResourceClient {
    async fn get(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
    ) -> PipelineResult<Value> {
        let key = resource_key(group, version, namespace, plural, name);
        self.calls
            .lock()
            .unwrap()
            .push(CustomResourceCall::Get(key.clone()));
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(plural, name))
    }

    async fn create(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        body: &Value,
    ) -> PipelineResult<Value> {
        let name = body["metadata"]["name"].as_str().unwrap_or_default();
        let key = resource_key(group, version, namespace, plural, name);
        self.calls
            .lock()
            .unwrap()
            .push(CustomResourceCall::Create(key.clone()));
        self.objects.lock().unwrap().insert(key, body.clone());
        Ok(body.clone())
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
        let key = resource_key(group, version, namespace, plural, name);
        self.calls
            .lock()
            .unwrap()
            .push(CustomResourceCall::MergePatch(key.clone()));
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get_mut(&key)
            .ok_or_else(|| PipelineError::not_found(plural, name))?;
        merge_patch(current, body);
        Ok(current.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeObjectStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_deletes: Arc<Mutex<bool>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> PipelineResult<()> {
        self.insert(key, bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("object", key))
    }

    async fn delete(&self, key: &str) -> PipelineResult<()> {
        if *self.fail_deletes.lock().unwrap() {
            return Err(PipelineError::Internal(format!("cannot delete {key}")));
        }
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }

    fn pipeline_key(&self, version_id: &str) -> String {
        format!("pipelines/{version_id}")
    }
}

/// Archived logs live at `logs/<object>/<node>/main.log`, stored as plain
/// text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainLogArchive;

impl LogArchive for PlainLogArchive {
    fn log_object_key(&self, workflow: &Workflow, node_id: &str) -> PipelineResult<String> {
        Ok(format!("logs/{}/{node_id}/main.log", workflow.name()))
    }

    fn extract_log(&self, archived: &[u8]) -> PipelineResult<Vec<u8>> {
        Ok(archived.to_vec())
    }
}

/// Allows every identity except those listed with a denial reason.
#[derive(Debug, Clone, Default)]
pub struct FakeAuthorizationClient {
    denied: Arc<Mutex<HashMap<String, String>>>,
    checks: Arc<Mutex<Vec<(String, ResourceAttributes)>>>,
}

impl FakeAuthorizationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, identity: &str, reason: &str) {
        self.denied
            .lock()
            .unwrap()
            .insert(identity.to_string(), reason.to_string());
    }

    pub fn checks(&self) -> Vec<(String, ResourceAttributes)> {
        self.checks.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationClient for FakeAuthorizationClient {
    async fn check(
        &self,
        identity: &str,
        attributes: &ResourceAttributes,
    ) -> PipelineResult<AuthorizationDecision> {
        self.checks
            .lock()
            .unwrap()
            .push((identity.to_string(), attributes.clone()));
        Ok(match self.denied.lock().unwrap().get(identity) {
            Some(reason) => AuthorizationDecision {
                allowed: false,
                reason: reason.clone(),
            },
            None => AuthorizationDecision {
                allowed: true,
                reason: String::new(),
            },
        })
    }
}

/// Authenticator with a fixed outcome.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    identity: Option<String>,
    failure: String,
}

impl StaticAuthenticator {
    pub fn succeeding(identity: &str) -> Self {
        Self {
            identity: Some(identity.to_string()),
            failure: String::new(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            identity: None,
            failure: reason.to_string(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, _request: &RequestContext) -> PipelineResult<String> {
        self.identity
            .clone()
            .ok_or_else(|| PipelineError::Unauthenticated(self.failure.clone()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingGcObserver {
    collected: Arc<AtomicUsize>,
}

impl RecordingGcObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.collected.load(Ordering::SeqCst)
    }
}

impl GcObserver for RecordingGcObserver {
    fn workflow_collected(&self, _namespace: &str) {
        self.collected.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_with_stale_resource_version_conflicts() {
        let client: FakeClusterClient<Workflow> = FakeClusterClient::new("wf");
        let template: Workflow =
            serde_json::from_value(json!({"kind": "PipelineRun", "metadata": {"generateName": "a-"}}))
                .unwrap();
        let created = client.create("ns", &template).await.unwrap();
        assert_eq!(created.metadata.name, "a-00001");
        assert_eq!(created.metadata.uid, "wf-1");

        let mut stale = created.clone();
        client
            .patch("ns", "a-00001", &json!({"metadata": {"labels": {"k": "v"}}}))
            .await
            .unwrap();
        stale.spec.status = "PipelineRunCancelled".to_string();
        let err = client.update("ns", &stale).await.unwrap_err();
        assert!(err.is_already_exists());

        let fresh = client.get("ns", "a-00001").await.unwrap();
        assert_eq!(fresh.metadata.labels["k"], "v");
        assert_eq!(fresh.metadata.resource_version, "2");
    }

    #[tokio::test]
    async fn test_injected_failure_is_bounded() {
        let client: FakeClusterClient<Workflow> = FakeClusterClient::new("wf");
        client.fail(ClusterOp::Delete, Some("x"), 500, Some(1));
        assert!(client.delete("ns", "x").await.unwrap_err().is_retryable());
        assert!(client.delete("ns", "x").await.unwrap_err().is_not_found());
        assert_eq!(client.calls_of(ClusterOp::Delete).len(), 2);
    }
}
