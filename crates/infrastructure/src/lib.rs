//! Adapters behind the domain ports: PostgreSQL entity stores, the cluster
//! REST client, the filesystem blob store and process-wide observability.

pub mod cluster;
pub mod database;
pub mod log_archive;
pub mod object_store;
pub mod observability;

pub use cluster::{
    ClusterClient, KubeAuthorizationClient, KubeCustomResourceClient, KubePodClient,
    KubeResourceClient, ResourceKind,
};
pub use database::{
    DatabaseManager, PostgresExperimentRepository, PostgresJobRepository,
    PostgresPipelineRepository, PostgresReferenceRepository, PostgresRunRepository,
};
pub use log_archive::PodLogArchive;
pub use object_store::FileObjectStore;
pub use observability::{init_logging, init_metrics, MetricsGcObserver, WORKFLOW_GC_TOTAL};
