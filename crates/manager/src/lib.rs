//! Resource manager: keeps the entity stores and the cluster's execution
//! objects consistent for every run, job, experiment and pipeline operation.
//!
//! Creation paths write to the cluster first and to the database second.
//! Deletion paths soft-delete the row first and clean up the cluster object
//! or blob afterwards. Status reports from the controllers flow back through
//! [`ResourceManager::report_workflow`] and are idempotent.

use std::sync::Arc;

use pipeline_core::{Clock, ManagerOptions, UuidGenerator};
use pipeline_domain::ports::{
    AuthorizationClient, Authenticator, ClusterResourceClient, CustomResourceClient, GcObserver,
    LogArchive, ObjectStore, PodClient,
};
use pipeline_domain::repositories::{
    DefaultExperimentRepository, ExperimentRepository, JobRepository, PipelineRepository,
    ResourceReferenceRepository, RunRepository,
};
use pipeline_domain::{ScheduledWorkflow, Workflow};

pub mod archival;
pub mod auth;
pub mod custom_resources;
pub mod experiments;
pub mod jobs;
pub mod logs;
pub mod metrics;
pub mod namespace;
pub mod pipelines;
pub mod retry;
pub mod runs;
pub mod state_listener;
pub mod template;

pub use auth::HeaderAuthenticator;
pub use retry::RetryState;

/// Entity stores used by the manager.
#[derive(Clone)]
pub struct Stores {
    pub experiments: Arc<dyn ExperimentRepository>,
    pub default_experiment: Arc<dyn DefaultExperimentRepository>,
    pub pipelines: Arc<dyn PipelineRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub runs: Arc<dyn RunRepository>,
    pub references: Arc<dyn ResourceReferenceRepository>,
}

/// Cluster, blob store and identity collaborators.
#[derive(Clone)]
pub struct ClientManager {
    pub workflows: Arc<dyn ClusterResourceClient<Workflow>>,
    pub scheduled_workflows: Arc<dyn ClusterResourceClient<ScheduledWorkflow>>,
    pub pods: Arc<dyn PodClient>,
    pub custom_resources: Arc<dyn CustomResourceClient>,
    pub object_store: Arc<dyn ObjectStore>,
    pub log_archive: Arc<dyn LogArchive>,
    pub authorizer: Arc<dyn AuthorizationClient>,
    /// Tried in order; the first success wins.
    pub authenticators: Vec<Arc<dyn Authenticator>>,
    pub gc_observer: Arc<dyn GcObserver>,
    pub clock: Arc<dyn Clock>,
    pub uuid: Arc<dyn UuidGenerator>,
}

pub struct ResourceManager {
    stores: Stores,
    clients: ClientManager,
    options: ManagerOptions,
    /// Namespace of this process; used when multi-user mode is off.
    pod_namespace: String,
}

impl ResourceManager {
    pub fn new(
        stores: Stores,
        clients: ClientManager,
        options: ManagerOptions,
        pod_namespace: impl Into<String>,
    ) -> Self {
        Self {
            stores,
            clients,
            options,
            pod_namespace: pod_namespace.into(),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn is_multi_user_mode(&self) -> bool {
        self.options.multi_user_mode
    }

    fn now(&self) -> i64 {
        self.clients.clock.now().timestamp()
    }

    fn new_id(&self) -> String {
        self.clients.uuid.new_uuid().to_string()
    }
}
