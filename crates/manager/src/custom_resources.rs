//! Upsert of inline custom-resource templates declared by an execution
//! object.

use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::custom_resources::CustomResource;
use tracing::debug;

use crate::ResourceManager;

impl ResourceManager {
    /// Creates absent resources and merge-patches existing ones.
    pub async fn apply_custom_resources(
        &self,
        namespace: &str,
        resources: &[CustomResource],
    ) -> PipelineResult<()> {
        let client = &self.clients.custom_resources;
        for resource in resources {
            let existing = client
                .get(
                    &resource.group,
                    &resource.version,
                    namespace,
                    &resource.plural,
                    &resource.name,
                )
                .await;
            let result = match existing {
                Err(e) if e.is_not_found() => {
                    debug!(kind = %resource.plural, name = %resource.name, "Creating custom resource");
                    client
                        .create(
                            &resource.group,
                            &resource.version,
                            namespace,
                            &resource.plural,
                            &resource.body,
                        )
                        .await
                }
                Err(e) => Err(e),
                Ok(_) => {
                    debug!(kind = %resource.plural, name = %resource.name, "Patching custom resource");
                    client
                        .merge_patch(
                            &resource.group,
                            &resource.version,
                            namespace,
                            &resource.plural,
                            &resource.name,
                            &resource.body,
                        )
                        .await
                }
            };
            result.map_err(|e| {
                PipelineError::internal(
                    e,
                    format!("Failed to apply custom resource {}/{}", resource.plural, resource.name),
                )
            })?;
        }
        Ok(())
    }
}
