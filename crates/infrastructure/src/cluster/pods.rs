use async_trait::async_trait;
use pipeline_core::PipelineResult;
use pipeline_domain::ports::PodClient;
use reqwest::Method;
use tracing::debug;

use super::client::ClusterClient;

pub struct KubePodClient {
    client: ClusterClient,
}

impl KubePodClient {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    fn pod_path(namespace: &str, name: &str) -> String {
        format!("/api/v1/namespaces/{namespace}/pods/{name}")
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn delete_pod(&self, namespace: &str, name: &str) -> PipelineResult<()> {
        debug!(namespace, pod = name, "Deleting pod");
        let request = self
            .client
            .request(Method::DELETE, &Self::pod_path(namespace, name));
        self.client.send_empty(request).await
    }

    async fn read_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        follow: bool,
    ) -> PipelineResult<Vec<u8>> {
        let path = format!("{}/log", Self::pod_path(namespace, pod));
        let request = self
            .client
            .request(Method::GET, &path)
            .query(&[("container", container), ("follow", if follow { "true" } else { "false" })]);
        self.client.send_bytes(request).await
    }
}
