//! Resolves the raw execution template of a run or job request.

use pipeline_core::{PipelineError, PipelineResult, ResultExt};
use pipeline_domain::{find_reference, PipelineSpec, Relationship, ResourceRef, ResourceType, Workflow};

use crate::ResourceManager;

impl ResourceManager {
    /// Inline manifests are returned verbatim. Otherwise the template comes
    /// from the pipeline version named by a creator reference; a bare
    /// pipeline id resolves to its default version, and that reference is
    /// added to `references`.
    pub async fn resolve_template(
        &self,
        spec: &PipelineSpec,
        references: &mut Vec<ResourceRef>,
    ) -> PipelineResult<Vec<u8>> {
        if !spec.workflow_manifest.is_empty() {
            return Ok(spec.workflow_manifest.as_bytes().to_vec());
        }

        self.convert_pipeline_id_to_default_version(spec, references)
            .await
            .context("Failed to find default version to create run with pipeline id")?;

        let version_id =
            find_reference(references, ResourceType::PipelineVersion, Relationship::Creator)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| PipelineError::invalid_input("No pipeline version"))?
                .to_string();
        let version = self
            .stores
            .pipelines
            .get_pipeline_version(&version_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("pipeline version", &version_id))?;

        let key = self.clients.object_store.pipeline_key(&version.id);
        let bytes = self
            .clients
            .object_store
            .get(&key)
            .await
            .context("Get pipeline YAML failed")?;
        let workflow = Workflow::from_bytes(&bytes).context("Failed to fetch workflow spec")?;
        Ok(workflow.to_manifest()?.into_bytes())
    }

    async fn convert_pipeline_id_to_default_version(
        &self,
        spec: &PipelineSpec,
        references: &mut Vec<ResourceRef>,
    ) -> PipelineResult<()> {
        if spec.pipeline_id.is_empty()
            || find_reference(references, ResourceType::PipelineVersion, Relationship::Creator)
                .is_some()
        {
            return Ok(());
        }
        let pipeline = self.get_pipeline(&spec.pipeline_id).await?;
        let version_id = pipeline.default_version_id.ok_or_else(|| {
            PipelineError::invalid_input(format!(
                "Pipeline {} has no default version",
                spec.pipeline_id
            ))
        })?;
        references.push(ResourceRef::new(
            ResourceType::PipelineVersion,
            version_id,
            Relationship::Creator,
        ));
        Ok(())
    }
}
