#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pipeline_core::{ConstantBackoff, ManagerOptions};
use pipeline_domain::ports::Authenticator;
use pipeline_domain::{ScheduledWorkflow, Workflow};
use pipeline_manager::{ClientManager, ResourceManager, Stores};
use pipeline_testing_utils::{
    ExperimentBuilder, FakeAuthorizationClient, FakeClusterClient, FakeCustomResourceClient,
    FakeObjectStore, FakePodClient, FixedClock, InMemoryStore, PlainLogArchive,
    RecordingGcObserver, SequentialUuidGenerator, StaticAuthenticator, TEST_NAMESPACE,
};

/// Resource manager wired to in-memory fakes, with handles to inspect them.
pub struct Harness {
    pub store: InMemoryStore,
    pub workflows: FakeClusterClient<Workflow>,
    pub scheduled_workflows: FakeClusterClient<ScheduledWorkflow>,
    pub pods: FakePodClient,
    pub custom_resources: FakeCustomResourceClient,
    pub objects: FakeObjectStore,
    pub authorizer: FakeAuthorizationClient,
    pub gc: RecordingGcObserver,
    pub clock: Arc<FixedClock>,
    pub manager: ResourceManager,
}

pub fn test_options() -> ManagerOptions {
    ManagerOptions {
        patch_backoff: ConstantBackoff::new(Duration::from_millis(1), 3),
        ..ManagerOptions::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_options(), vec![Arc::new(StaticAuthenticator::succeeding("alice"))])
    }

    pub fn with_options(options: ManagerOptions) -> Self {
        Self::build(options, vec![Arc::new(StaticAuthenticator::succeeding("alice"))])
    }

    pub fn with_authenticators(authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        Self::build(test_options(), authenticators)
    }

    fn build(options: ManagerOptions, authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        let store = InMemoryStore::new();
        let workflows = FakeClusterClient::new("wf-uid");
        let scheduled_workflows = FakeClusterClient::new("job-uid");
        let pods = FakePodClient::new();
        let custom_resources = FakeCustomResourceClient::new();
        let objects = FakeObjectStore::new();
        let authorizer = FakeAuthorizationClient::new();
        let gc = RecordingGcObserver::new();
        let clock = Arc::new(FixedClock::default());

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
            scheduled_workflows: Arc::new(scheduled_workflows.clone()),
            pods: Arc::new(pods.clone()),
            custom_resources: Arc::new(custom_resources.clone()),
            object_store: Arc::new(objects.clone()),
            log_archive: Arc::new(PlainLogArchive),
            authorizer: Arc::new(authorizer.clone()),
            authenticators,
            gc_observer: Arc::new(gc.clone()),
            clock: clock.clone(),
            uuid: Arc::new(SequentialUuidGenerator::new()),
        };
        let manager = ResourceManager::new(stores, clients, options, TEST_NAMESPACE);

        Self {
            store,
            workflows,
            scheduled_workflows,
            pods,
            custom_resources,
            objects,
            authorizer,
            gc,
            clock,
            manager,
        }
    }

    /// Adds the experiment `exp-1` without a namespace.
    pub fn with_experiment(self) -> Self {
        self.store.insert_experiment(ExperimentBuilder::new().build());
        self
    }
}
