//! Status reports from the execution controller.
//!
//! Reports are delivered at least once and may arrive after the object was
//! already persisted, so every step here is idempotent: an unchanged final
//! row is not rewritten, and an object carrying the persisted marker is
//! only deleted.

use pipeline_core::constants::LABEL_PERSISTED_FINAL_STATE;
use pipeline_core::{retry_with_backoff, PipelineError, PipelineResult, ResultExt};
use pipeline_domain::{
    PipelineSpecRecord, Relationship, ResourceReference, ResourceType, Run, StorageState,
    Workflow,
};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::ResourceManager;

impl ResourceManager {
    #[instrument(skip(self, workflow), fields(workflow = %workflow.name(), namespace = %workflow.namespace()))]
    pub async fn report_workflow(&self, workflow: &Workflow) -> PipelineResult<()> {
        let run_id = workflow
            .run_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "Workflow[{}] missing the Run ID label",
                    workflow.name()
                ))
            })?
            .to_string();
        let namespace = workflow.namespace();
        if namespace.is_empty() {
            return Err(PipelineError::invalid_input(format!(
                "Workflow[{}] missing namespace",
                workflow.name()
            )));
        }

        if workflow.persisted_final_state() {
            return self.collect_workflow(namespace, workflow.name()).await;
        }

        let condition = workflow.condition();
        let finished_at = workflow.finished_at();
        if self
            .already_recorded(&run_id, &condition, finished_at)
            .await?
        {
            debug!(run_id = %run_id, condition = %condition, "Final state already recorded");
        } else {
            match workflow.scheduled_workflow_uid() {
                None => {
                    let manifest = workflow.to_manifest()?;
                    self.stores
                        .runs
                        .update(&run_id, &condition, finished_at, &manifest)
                        .await
                        .context("Failed to update the run")?;
                }
                Some(job_id) => {
                    let run = self.run_from_report(workflow, &run_id, job_id).await?;
                    self.stores
                        .runs
                        .create_or_update(&run)
                        .await
                        .context("Failed to create or update the run")?;
                }
            }
        }

        if workflow.is_in_final_state() {
            self.mark_persisted(namespace, workflow.name()).await?;
        }
        Ok(())
    }

    /// Deletes an object whose final state is already in the database.
    async fn collect_workflow(&self, namespace: &str, name: &str) -> PipelineResult<()> {
        match self.clients.workflows.delete(namespace, name).await {
            Ok(()) => {
                self.clients.gc_observer.workflow_collected(namespace);
                info!(workflow = %name, namespace = %namespace, "Persisted execution object collected");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(PipelineError::not_found("workflow", name)),
            Err(e) => Err(PipelineError::internal(
                e,
                format!("Failed to delete the completed workflow for run {name}"),
            )),
        }
    }

    async fn already_recorded(
        &self,
        run_id: &str,
        condition: &str,
        finished_at: i64,
    ) -> PipelineResult<bool> {
        let Some(run) = self.stores.runs.get(run_id).await? else {
            return Ok(false);
        };
        Ok(run.finished_at != 0 && run.finished_at == finished_at && run.conditions == condition)
    }

    /// Job-spawned objects have no row yet on their first report; the row
    /// is derived from the object and the job's owning experiment.
    async fn run_from_report(
        &self,
        workflow: &Workflow,
        run_id: &str,
        job_id: &str,
    ) -> PipelineResult<Run> {
        let experiment = self
            .stores
            .references
            .get(job_id, ResourceType::Job, ResourceType::Experiment)
            .await?
            .ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "Failed to retrieve the experiment ID for the job {job_id} that created the run"
                ))
            })?;
        let job = self
            .get_job(job_id)
            .await
            .context("Failed to retrieve the job that created the run")?;

        let name = workflow.name().to_string();
        Ok(Run {
            id: run_id.to_string(),
            experiment_id: experiment.reference_id.clone(),
            display_name: name.clone(),
            name,
            storage_state: StorageState::Available,
            namespace: workflow.namespace().to_string(),
            service_account: workflow.spec.service_account_name.clone(),
            description: String::new(),
            created_at: workflow.metadata.created_at(),
            scheduled_at: workflow.scheduled_at_or_zero(),
            finished_at: workflow.finished_at(),
            conditions: workflow.condition(),
            pipeline_spec: PipelineSpecRecord {
                pipeline_id: job.pipeline_spec.pipeline_id.clone(),
                pipeline_name: job.pipeline_spec.pipeline_name.clone(),
                workflow_spec_manifest: workflow.spec_manifest()?,
                parameters: workflow.parameters_json()?,
            },
            workflow_runtime_manifest: workflow.to_manifest()?,
            resource_references: vec![
                ResourceReference {
                    resource_id: run_id.to_string(),
                    resource_type: ResourceType::Run,
                    reference_id: job_id.to_string(),
                    reference_name: job.name.clone(),
                    reference_type: ResourceType::Job,
                    relationship: Relationship::Creator,
                },
                ResourceReference {
                    resource_id: run_id.to_string(),
                    resource_type: ResourceType::Run,
                    reference_id: experiment.reference_id,
                    reference_name: experiment.reference_name,
                    reference_type: ResourceType::Experiment,
                    relationship: Relationship::Owner,
                },
            ],
        })
    }

    async fn mark_persisted(&self, namespace: &str, name: &str) -> PipelineResult<()> {
        let patch = json!({"metadata": {"labels": {LABEL_PERSISTED_FINAL_STATE: "true"}}});
        match retry_with_backoff(&self.options.patch_backoff, "mark_persisted", || {
            self.clients.workflows.patch(namespace, name, &patch)
        })
        .await
        {
            Ok(_) => {
                debug!(workflow = %name, "Marked final state as persisted");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(PipelineError::not_found("workflow", name)),
            Err(e) => Err(PipelineError::internal(
                e,
                format!("Failed to add PersistedFinalState label to workflow {name}"),
            )),
        }
    }
}
