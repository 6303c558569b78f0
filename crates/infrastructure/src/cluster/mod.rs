//! Cluster API adapters over plain REST.
//!
//! Every adapter shares one [`ClusterClient`]; paths follow the API server's
//! `/apis/{group}/{version}/namespaces/{namespace}/{plural}` layout.

mod authorization;
mod client;
mod pods;
mod resources;

pub use authorization::KubeAuthorizationClient;
pub use client::ClusterClient;
pub use pods::KubePodClient;
pub use resources::{KubeCustomResourceClient, KubeResourceClient};

use pipeline_core::constants::{
    SCHEDULED_WORKFLOW_GROUP, SCHEDULED_WORKFLOW_PLURAL, SCHEDULED_WORKFLOW_VERSION,
    WORKFLOW_GROUP, WORKFLOW_PLURAL, WORKFLOW_VERSION,
};

/// Group, version and plural of a namespaced custom resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceKind {
    pub group: &'static str,
    pub version: &'static str,
    pub plural: &'static str,
}

impl ResourceKind {
    pub const WORKFLOWS: ResourceKind = ResourceKind {
        group: WORKFLOW_GROUP,
        version: WORKFLOW_VERSION,
        plural: WORKFLOW_PLURAL,
    };

    pub const SCHEDULED_WORKFLOWS: ResourceKind = ResourceKind {
        group: SCHEDULED_WORKFLOW_GROUP,
        version: SCHEDULED_WORKFLOW_VERSION,
        plural: SCHEDULED_WORKFLOW_PLURAL,
    };

    pub fn collection_path(&self, namespace: &str) -> String {
        collection_path(self.group, self.version, namespace, self.plural)
    }

    pub fn item_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }
}

pub(crate) fn collection_path(group: &str, version: &str, namespace: &str, plural: &str) -> String {
    format!("/apis/{group}/{version}/namespaces/{namespace}/{plural}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_paths() {
        assert_eq!(
            ResourceKind::WORKFLOWS.collection_path("team-a"),
            "/apis/tekton.dev/v1beta1/namespaces/team-a/pipelineruns"
        );
        assert_eq!(
            ResourceKind::SCHEDULED_WORKFLOWS.item_path("kubeflow", "nightly"),
            "/apis/kubeflow.org/v1beta1/namespaces/kubeflow/scheduledworkflows/nightly"
        );
    }
}
