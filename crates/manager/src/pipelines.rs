//! Pipeline upload and versioning.
//!
//! Rows are written in `Creating`, the template blob is stored, and only
//! then are the rows flipped to `Ready`; readers never see a row without
//! its blob. Deletion mirrors this with `Deleting`.

use pipeline_core::{PipelineError, PipelineResult, ResultExt};
use pipeline_domain::{
    FilterContext, ListOptions, ListPage, Pipeline, PipelineStatus, PipelineVersion,
    PipelineVersionRequest, Workflow,
};
use tracing::{info, instrument, warn};

use crate::ResourceManager;

/// Validates an uploaded template and extracts its declared parameters.
fn template_parameters(bytes: &[u8]) -> PipelineResult<String> {
    let workflow = Workflow::from_bytes(bytes)
        .map_err(|e| PipelineError::invalid_input(format!("Invalid pipeline template: {e}")))?;
    if !workflow.is_execution_kind() {
        return Err(PipelineError::invalid_input(format!(
            "Unexpected resource type {}; only pipeline runs can be uploaded",
            workflow.kind
        )));
    }
    workflow.template_parameters_json()
}

impl ResourceManager {
    /// Creates a pipeline together with its first version. The version
    /// shares the pipeline's id and becomes the default.
    #[instrument(skip(self, description, template), fields(size = template.len()))]
    pub async fn create_pipeline(
        &self,
        name: &str,
        description: &str,
        namespace: &str,
        template: &[u8],
    ) -> PipelineResult<Pipeline> {
        if name.trim().is_empty() {
            return Err(PipelineError::invalid_input("Pipeline name is required"));
        }
        let parameters = template_parameters(template)?;

        let id = self.new_id();
        let now = self.now();
        let pipeline = Pipeline {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            namespace: namespace.to_string(),
            parameters: parameters.clone(),
            status: PipelineStatus::Creating,
            default_version_id: Some(id.clone()),
            created_at: now,
        };
        let version = PipelineVersion {
            id: id.clone(),
            name: name.to_string(),
            pipeline_id: id.clone(),
            parameters,
            code_source_url: String::new(),
            status: PipelineStatus::Creating,
            created_at: now,
        };
        let mut pipeline = self
            .stores
            .pipelines
            .create_pipeline(&pipeline, &version)
            .await
            .context("Failed to create a pipeline")?;

        let key = self.clients.object_store.pipeline_key(&version.id);
        self.clients
            .object_store
            .put(&key, template)
            .await
            .map_err(|e| PipelineError::internal(e, "Create pipeline failed"))?;

        self.stores
            .pipelines
            .update_pipeline_status(&id, PipelineStatus::Ready)
            .await
            .map_err(|e| PipelineError::internal(e, "Failed to update status of the pipeline"))?;
        self.stores
            .pipelines
            .update_pipeline_version_status(&id, PipelineStatus::Ready)
            .await
            .map_err(|e| {
                PipelineError::internal(e, "Failed to update status of the pipeline version")
            })?;
        pipeline.status = PipelineStatus::Ready;
        info!(pipeline_id = %id, "Pipeline created");
        Ok(pipeline)
    }

    pub async fn get_pipeline(&self, id: &str) -> PipelineResult<Pipeline> {
        self.stores
            .pipelines
            .get_pipeline(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("pipeline", id))
    }

    pub async fn list_pipelines(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Pipeline>> {
        self.stores.pipelines.list_pipelines(filter, opts).await
    }

    /// Default version's template.
    pub async fn get_pipeline_template(&self, pipeline_id: &str) -> PipelineResult<Vec<u8>> {
        let pipeline = self.get_pipeline(pipeline_id).await?;
        let version_id = pipeline.default_version_id.ok_or_else(|| {
            PipelineError::not_found("default version of pipeline", pipeline_id)
        })?;
        self.read_template(&version_id).await
    }

    pub async fn update_pipeline_default_version(
        &self,
        pipeline_id: &str,
        version_id: &str,
    ) -> PipelineResult<()> {
        self.get_pipeline(pipeline_id).await?;
        let version = self.get_pipeline_version(version_id).await?;
        if version.pipeline_id != pipeline_id {
            return Err(PipelineError::invalid_input(format!(
                "Version {version_id} does not belong to pipeline {pipeline_id}"
            )));
        }
        self.stores
            .pipelines
            .update_pipeline_default_version(pipeline_id, version_id)
            .await
    }

    /// Soft-deletes the pipeline, then removes its blobs and row. Cleanup
    /// failures after the soft delete are logged; the row stays hidden.
    #[instrument(skip(self))]
    pub async fn delete_pipeline(&self, id: &str) -> PipelineResult<()> {
        self.get_pipeline(id).await.context("Delete pipeline failed")?;
        let versions = self.all_versions(id).await?;

        self.stores
            .pipelines
            .update_pipeline_status(id, PipelineStatus::Deleting)
            .await
            .map_err(|e| {
                PipelineError::internal(e, format!("Failed to change the status of pipeline {id}"))
            })?;

        for version in &versions {
            let key = self.clients.object_store.pipeline_key(&version.id);
            if let Err(e) = self.clients.object_store.delete(&key).await {
                warn!(pipeline_id = %id, key = %key, error = %e, "Failed to delete pipeline template");
                return Ok(());
            }
        }
        if let Err(e) = self.stores.pipelines.delete_pipeline(id).await {
            warn!(pipeline_id = %id, error = %e, "Failed to delete pipeline row");
        }
        Ok(())
    }

    async fn all_versions(&self, pipeline_id: &str) -> PipelineResult<Vec<PipelineVersion>> {
        let mut opts = ListOptions::default();
        let mut versions = Vec::new();
        loop {
            let page = self
                .stores
                .pipelines
                .list_pipeline_versions(pipeline_id, &opts)
                .await?;
            versions.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => opts = opts.next(token),
                _ => return Ok(versions),
            }
        }
    }

    /// Adds a version to the pipeline named by the request's owner
    /// reference, optionally making it the default.
    #[instrument(skip(self, request, template), fields(name = %request.name))]
    pub async fn create_pipeline_version(
        &self,
        request: &PipelineVersionRequest,
        template: &[u8],
        update_default: bool,
    ) -> PipelineResult<PipelineVersion> {
        if request.name.trim().is_empty() {
            return Err(PipelineError::invalid_input("Pipeline version name is required"));
        }
        let pipeline_id = request.pipeline_id()?;
        self.get_pipeline(pipeline_id).await?;
        let parameters = template_parameters(template)?;

        let version = PipelineVersion {
            id: self.new_id(),
            name: request.name.clone(),
            pipeline_id: pipeline_id.to_string(),
            parameters,
            code_source_url: request.code_source_url.clone(),
            status: PipelineStatus::Creating,
            created_at: self.now(),
        };
        let mut version = self
            .stores
            .pipelines
            .create_pipeline_version(&version, update_default)
            .await
            .context("Failed to create a pipeline version")?;

        let key = self.clients.object_store.pipeline_key(&version.id);
        self.clients
            .object_store
            .put(&key, template)
            .await
            .map_err(|e| PipelineError::internal(e, "Create pipeline version failed"))?;

        self.stores
            .pipelines
            .update_pipeline_version_status(&version.id, PipelineStatus::Ready)
            .await
            .map_err(|e| {
                PipelineError::internal(e, "Failed to update status of the pipeline version")
            })?;
        version.status = PipelineStatus::Ready;
        info!(pipeline_id, version_id = %version.id, "Pipeline version created");
        Ok(version)
    }

    pub async fn get_pipeline_version(&self, id: &str) -> PipelineResult<PipelineVersion> {
        self.stores
            .pipelines
            .get_pipeline_version(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("pipeline version", id))
    }

    pub async fn list_pipeline_versions(
        &self,
        pipeline_id: &str,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<PipelineVersion>> {
        self.stores
            .pipelines
            .list_pipeline_versions(pipeline_id, opts)
            .await
    }

    pub async fn get_pipeline_version_template(&self, version_id: &str) -> PipelineResult<Vec<u8>> {
        self.get_pipeline_version(version_id).await?;
        self.read_template(version_id).await
    }

    async fn read_template(&self, version_id: &str) -> PipelineResult<Vec<u8>> {
        let key = self.clients.object_store.pipeline_key(version_id);
        self.clients
            .object_store
            .get(&key)
            .await
            .context("Get pipeline template failed")
    }

    #[instrument(skip(self))]
    pub async fn delete_pipeline_version(&self, id: &str) -> PipelineResult<()> {
        self.get_pipeline_version(id)
            .await
            .context("Delete pipeline version failed")?;
        self.stores
            .pipelines
            .update_pipeline_version_status(id, PipelineStatus::Deleting)
            .await
            .map_err(|e| {
                PipelineError::internal(
                    e,
                    format!("Failed to change the status of pipeline version {id}"),
                )
            })?;

        let key = self.clients.object_store.pipeline_key(id);
        if let Err(e) = self.clients.object_store.delete(&key).await {
            warn!(version_id = %id, error = %e, "Failed to delete pipeline version template");
            return Ok(());
        }
        if let Err(e) = self.stores.pipelines.delete_pipeline_version(id).await {
            warn!(version_id = %id, error = %e, "Failed to delete pipeline version row");
        }
        Ok(())
    }
}
