#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use pipeline_api::{create_app, AppState};
use pipeline_core::config::ApiConfig;
use pipeline_core::{ConstantBackoff, ManagerOptions};
use pipeline_domain::ports::Authenticator;
use pipeline_domain::{ScheduledWorkflow, Workflow};
use pipeline_manager::{ClientManager, ResourceManager, Stores};
use pipeline_testing_utils::{
    FakeAuthorizationClient, FakeClusterClient, FakeCustomResourceClient, FakeObjectStore,
    FakePodClient, FixedClock, InMemoryStore, PlainLogArchive, RecordingGcObserver,
    SequentialUuidGenerator, StaticAuthenticator, TEST_NAMESPACE,
};
use serde_json::Value;
use tower::ServiceExt;

/// Router over a resource manager wired to in-memory fakes.
pub struct TestApp {
    pub store: InMemoryStore,
    pub workflows: FakeClusterClient<Workflow>,
    pub objects: FakeObjectStore,
    pub authorizer: FakeAuthorizationClient,
    pub router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(false, vec![Arc::new(StaticAuthenticator::succeeding("alice"))])
    }

    pub fn with_auth(authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        Self::build(true, authenticators)
    }

    fn build(auth_enabled: bool, authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        let store = InMemoryStore::new();
        let workflows = FakeClusterClient::new("wf-uid");
        let scheduled_workflows: FakeClusterClient<ScheduledWorkflow> =
            FakeClusterClient::new("job-uid");
        let objects = FakeObjectStore::new();
        let authorizer = FakeAuthorizationClient::new();

        let shared = Arc::new(store.clone());
        let stores = Stores {
            experiments: shared.clone(),
            default_experiment: shared.clone(),
            pipelines: shared.clone(),
            jobs: shared.clone(),
            runs: shared.clone(),
            references: shared,
        };
        let clients = ClientManager {
            workflows: Arc::new(workflows.clone()),
            scheduled_workflows: Arc::new(scheduled_workflows),
            pods: Arc::new(FakePodClient::new()),
            custom_resources: Arc::new(FakeCustomResourceClient::new()),
            object_store: Arc::new(objects.clone()),
            log_archive: Arc::new(PlainLogArchive),
            authorizer: Arc::new(authorizer.clone()),
            authenticators,
            gc_observer: Arc::new(RecordingGcObserver::new()),
            clock: Arc::new(FixedClock::default()),
            uuid: Arc::new(SequentialUuidGenerator::new()),
        };
        let options = ManagerOptions {
            patch_backoff: ConstantBackoff::new(Duration::from_millis(1), 3),
            ..ManagerOptions::default()
        };
        let manager = ResourceManager::new(stores, clients, options, TEST_NAMESPACE);
        let state = AppState::new(Arc::new(manager), auth_enabled);

        Self {
            store,
            workflows,
            objects,
            authorizer,
            router: create_app(state, &ApiConfig::default()),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            content_type,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_bytes(&self, uri: &str, body: Vec<u8>) -> TestResponse {
        self.send(Request::post(uri).body(Body::from(body)).unwrap())
            .await
    }
}
