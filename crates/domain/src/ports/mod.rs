pub mod auth;
pub mod cluster;
pub mod logs;
pub mod object_store;

pub use auth::{AuthorizationClient, AuthorizationDecision, Authenticator, RequestContext, ResourceAttributes};
pub use cluster::{ClusterResourceClient, CustomResourceClient, GcObserver, PodClient};
pub use logs::LogArchive;
pub use object_store::ObjectStore;
