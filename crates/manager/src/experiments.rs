use pipeline_core::constants::{DEFAULT_EXPERIMENT_DESCRIPTION, DEFAULT_EXPERIMENT_NAME};
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    Experiment, ExperimentRequest, FilterContext, ListOptions, ListPage, StorageState,
};
use tracing::{info, instrument, warn};

use crate::ResourceManager;

impl ResourceManager {
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_experiment(&self, request: &ExperimentRequest) -> PipelineResult<Experiment> {
        if request.name.trim().is_empty() {
            return Err(PipelineError::invalid_input("Experiment name is required"));
        }
        let experiment = Experiment {
            id: self.new_id(),
            name: request.name.clone(),
            description: request.description.clone(),
            namespace: request.namespace().to_string(),
            created_at: self.now(),
            storage_state: StorageState::Available,
        };
        self.stores.experiments.create(&experiment).await
    }

    pub async fn get_experiment(&self, id: &str) -> PipelineResult<Experiment> {
        self.stores
            .experiments
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("experiment", id))
    }

    pub async fn list_experiments(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Experiment>> {
        self.stores.experiments.list(filter, opts).await
    }

    pub async fn delete_experiment(&self, id: &str) -> PipelineResult<()> {
        self.get_experiment(id).await?;
        self.stores.experiments.delete(id).await
    }

    /// Returns the id of the experiment collecting runs that name none,
    /// creating it on first use. Concurrent callers converge on one id.
    pub async fn create_default_experiment(&self) -> PipelineResult<String> {
        if let Some(id) = self
            .stores
            .default_experiment
            .get_default_experiment_id()
            .await?
            .filter(|id| !id.is_empty())
        {
            return Ok(id);
        }

        let request = ExperimentRequest {
            name: DEFAULT_EXPERIMENT_NAME.to_string(),
            description: DEFAULT_EXPERIMENT_DESCRIPTION.to_string(),
            resource_references: Vec::new(),
        };
        let (experiment, created_here) = match self.create_experiment(&request).await {
            Ok(experiment) => (experiment, true),
            Err(e) if e.is_already_exists() => {
                let existing = self
                    .stores
                    .experiments
                    .get_by_name(DEFAULT_EXPERIMENT_NAME, "")
                    .await?
                    .ok_or_else(|| {
                        PipelineError::internal(e, "Failed to create default experiment")
                    })?;
                (existing, false)
            }
            Err(e) => return Err(PipelineError::internal(e, "Failed to create default experiment")),
        };

        let stored = self
            .stores
            .default_experiment
            .set_default_experiment_id_if_absent(&experiment.id)
            .await
            .map_err(|e| PipelineError::internal(e, "Failed to set default experiment ID"))?;
        if created_here && stored != experiment.id {
            if let Err(e) = self.stores.experiments.delete(&experiment.id).await {
                warn!(experiment_id = %experiment.id, error = %e, "Failed to remove duplicate default experiment");
            }
        }
        info!(experiment_id = %stored, "Default experiment is set");
        Ok(stored)
    }
}
