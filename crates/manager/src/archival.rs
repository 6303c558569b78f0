//! Experiment archival with its job-disabling cascade.

use pipeline_core::{PipelineError, PipelineResult, ResultExt};
use pipeline_domain::{FilterContext, ListOptions, ResourceType};
use tracing::{info, instrument};

use crate::ResourceManager;

impl ResourceManager {
    /// Disables the recurring definition of every job in the experiment,
    /// page by page, then marks the experiment archived. Any failed patch
    /// aborts the cascade and leaves the experiment unarchived.
    #[instrument(skip(self))]
    pub async fn archive_experiment(&self, experiment_id: &str) -> PipelineResult<()> {
        self.get_experiment(experiment_id)
            .await
            .context("Archive experiment failed")?;

        let filter = FilterContext::by(ResourceType::Experiment, experiment_id);
        let mut opts = ListOptions::with_page_size(self.options.archive_page_size);
        let mut disabled = 0usize;
        loop {
            let page = self
                .stores
                .jobs
                .list(&filter, &opts)
                .await
                .map_err(|e| {
                    PipelineError::internal(
                        e,
                        format!("Failed to list jobs of to-be-archived experiment {experiment_id}"),
                    )
                })?;
            for job in &page.items {
                self.set_definition_enabled(job, false).await.map_err(|e| {
                    PipelineError::internal(
                        e,
                        format!(
                            "Failed to disable job {} while archiving experiment {experiment_id}",
                            job.id
                        ),
                    )
                })?;
                disabled += 1;
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => opts = opts.next(token),
                _ => break,
            }
        }

        self.stores
            .experiments
            .archive(experiment_id)
            .await
            .context("Archive experiment failed")?;
        info!(experiment_id, jobs_disabled = disabled, "Experiment archived");
        Ok(())
    }

    /// Restores the experiment only; its jobs stay disabled.
    pub async fn unarchive_experiment(&self, experiment_id: &str) -> PipelineResult<()> {
        self.get_experiment(experiment_id)
            .await
            .context("Unarchive experiment failed")?;
        self.stores.experiments.unarchive(experiment_id).await
    }
}
