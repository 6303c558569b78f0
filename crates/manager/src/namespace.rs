//! Namespace and owning-experiment resolution from resource references.

use pipeline_core::{PipelineError, PipelineResult, ResultExt};
use pipeline_domain::{find_reference, Relationship, ResourceRef, ResourceType};
use tracing::info;

use crate::ResourceManager;

impl ResourceManager {
    /// Namespace of the experiment owning the request. Falls back to the
    /// process namespace when the experiment has none and multi-user mode is
    /// off.
    pub async fn resolve_namespace(&self, references: &[ResourceRef]) -> PipelineResult<String> {
        let experiment_id =
            find_reference(references, ResourceType::Experiment, Relationship::Owner)
                .ok_or_else(|| {
                    PipelineError::invalid_input("Experiment is required in resource references")
                })?;
        let experiment = self
            .get_experiment(experiment_id)
            .await
            .context("Failed to get experiment")?;

        if !experiment.namespace.is_empty() {
            return Ok(experiment.namespace);
        }
        if self.options.multi_user_mode {
            return Err(PipelineError::invalid_input(format!(
                "Experiment {} doesn't have a namespace",
                experiment.name
            )));
        }
        Ok(self.pod_namespace.clone())
    }

    /// Adds an owner reference to the default experiment when the request
    /// names no experiment. Multi-user mode requires an explicit one.
    pub async fn ensure_owning_experiment(
        &self,
        mut references: Vec<ResourceRef>,
    ) -> PipelineResult<Vec<ResourceRef>> {
        if find_reference(&references, ResourceType::Experiment, Relationship::Owner).is_some() {
            return Ok(references);
        }
        if self.options.multi_user_mode {
            return Err(PipelineError::invalid_input(
                "Experiment is required in resource references",
            ));
        }

        let default_id = match self.stores.default_experiment.get_default_experiment_id().await {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                info!("No default experiment was found, creating one");
                self.create_default_experiment().await?
            }
            Err(e) => {
                return Err(PipelineError::internal(e, "Failed to retrieve default experiment"))
            }
        };
        references.push(ResourceRef::new(
            ResourceType::Experiment,
            default_id,
            Relationship::Owner,
        ));
        Ok(references)
    }

    pub async fn get_namespace_from_experiment_id(&self, id: &str) -> PipelineResult<String> {
        let experiment = self
            .get_experiment(id)
            .await
            .context("Failed to get namespace from experiment ID")?;
        Ok(experiment.namespace)
    }

    pub async fn get_namespace_from_run_id(&self, id: &str) -> PipelineResult<String> {
        let run = self
            .get_run(id)
            .await
            .context("Failed to get namespace from run ID")?;
        Ok(run.namespace)
    }

    pub async fn get_namespace_from_job_id(&self, id: &str) -> PipelineResult<String> {
        let job = self
            .get_job(id)
            .await
            .context("Failed to get namespace from job ID")?;
        Ok(job.namespace)
    }

    pub async fn get_namespace_from_pipeline_id(&self, id: &str) -> PipelineResult<String> {
        let pipeline = self
            .get_pipeline(id)
            .await
            .context("Failed to get namespace from pipeline ID")?;
        Ok(pipeline.namespace)
    }

    pub async fn get_namespace_from_pipeline_version_id(&self, id: &str) -> PipelineResult<String> {
        let version = self
            .get_pipeline_version(id)
            .await
            .context("Failed to get namespace from pipeline version ID")?;
        self.get_namespace_from_pipeline_id(&version.pipeline_id).await
    }
}
