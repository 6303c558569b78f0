//! Recurring jobs backed by a `ScheduledWorkflow` per job.
//!
//! The job row owns the user's intent (enabled or not); the recurring
//! definition owns trigger evaluation. `enabled` changes go to the cluster
//! first as a merge patch so controller-owned fields stay untouched.

use pipeline_core::{retry_with_backoff, PipelineError, PipelineResult, ResultExt};
use pipeline_domain::scheduled_workflow::{
    ScheduledWorkflowSpec, SwfParameter, SwfTrigger, WorkflowResource,
};
use pipeline_domain::{
    generated_name_for, mutate, FilterContext, Job, JobRequest, JobStatus, ListOptions, ListPage,
    MutationRequest, PipelineSpecRecord, ResourceType, ScheduledWorkflow, Trigger,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::runs::to_model_references;
use crate::ResourceManager;

impl ResourceManager {
    #[instrument(skip(self, request), fields(job_name = %request.name))]
    pub async fn create_job(&self, request: &JobRequest) -> PipelineResult<Job> {
        request.trigger.validate()?;
        let generate_name = generated_name_for(&request.name).context("Create job failed")?;

        let mut references = request.resource_references.clone();
        let template = self
            .resolve_template(&request.pipeline_spec, &mut references)
            .await?;

        let parameters = request.pipeline_spec.parameters_map();
        let mutation = MutationRequest {
            parameters: &parameters,
            service_account: &request.service_account,
            run: None,
        };
        let mutated = mutate(&template, &mutation, &self.options).context("Create job failed")?;

        let references = self.ensure_owning_experiment(references).await?;
        let namespace = self.resolve_namespace(&references).await?;

        if !mutated.custom_resources.is_empty() {
            self.apply_custom_resources(&namespace, &mutated.custom_resources)
                .await
                .context("Apply custom resources failed")?;
        }

        let spec = ScheduledWorkflowSpec {
            enabled: request.enabled,
            max_concurrency: Some(request.max_concurrency),
            no_catchup: Some(request.no_catchup),
            trigger: SwfTrigger::from(&request.trigger),
            workflow: Some(WorkflowResource {
                parameters: request
                    .pipeline_spec
                    .parameters
                    .iter()
                    .map(|p| SwfParameter {
                        name: p.name.clone(),
                        value: p.value.clone(),
                    })
                    .collect(),
                spec: mutated.workflow.spec.clone(),
            }),
            extra: Default::default(),
        };
        let definition = ScheduledWorkflow::new(generate_name.clone(), spec);
        let created = self
            .clients
            .scheduled_workflows
            .create(&namespace, &definition)
            .await
            .map_err(|e| {
                PipelineError::internal(
                    e,
                    format!("Failed to create a scheduled workflow for ({generate_name})"),
                )
            })?;
        info!(job_id = %created.metadata.uid, name = %created.metadata.name, namespace = %namespace, "Recurring definition created");

        let now = self.now();
        let job = Job {
            id: created.metadata.uid.clone(),
            display_name: request.name.clone(),
            name: created.metadata.name.clone(),
            namespace: namespace.clone(),
            service_account: mutated.workflow.spec.service_account_name.clone(),
            description: request.description.clone(),
            max_concurrency: request.max_concurrency,
            no_catchup: request.no_catchup,
            enabled: request.enabled,
            trigger: request.trigger.clone(),
            conditions: created.condition(),
            status: JobStatus::Ready,
            pipeline_spec: PipelineSpecRecord {
                pipeline_id: request.pipeline_spec.pipeline_id.clone(),
                pipeline_name: request.pipeline_spec.pipeline_name.clone(),
                workflow_spec_manifest: String::from_utf8_lossy(&template).into_owned(),
                parameters: request.pipeline_spec.parameters_json()?,
            },
            resource_references: to_model_references(
                &created.metadata.uid,
                ResourceType::Job,
                &references,
            ),
            created_at: now,
            updated_at: now,
        };
        self.stores.jobs.create(&job).await.context("Create job failed")
    }

    pub async fn get_job(&self, id: &str) -> PipelineResult<Job> {
        self.stores
            .jobs
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("job", id))
    }

    pub async fn list_jobs(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Job>> {
        self.stores.jobs.list(filter, opts).await
    }

    /// Definitions cannot be addressed by UID, so the row's name is used to
    /// fetch the live object and its UID must still match the job id.
    async fn check_job_exists(&self, id: &str) -> PipelineResult<Job> {
        let job = self.get_job(id).await.context("Check job exist failed")?;
        let definition = self
            .clients
            .scheduled_workflows
            .get(&job.namespace, &job.name)
            .await
            .map_err(|e| PipelineError::internal(e, "Check job exist failed"))?;
        if definition.metadata.uid != id {
            return Err(PipelineError::not_found("job", &job.name));
        }
        Ok(job)
    }

    #[instrument(skip(self))]
    pub async fn enable_job(&self, id: &str, enabled: bool) -> PipelineResult<()> {
        let job = if enabled {
            self.check_job_exists(id).await
        } else {
            self.get_job(id).await
        }
        .context("Enable/Disable job failed")?;

        self.set_definition_enabled(&job, enabled).await?;

        self.stores
            .jobs
            .enable(id, enabled, self.now())
            .await
            .context(&format!(
                "Failed to enable/disable job. Enabled: {enabled}, jobID: {id}"
            ))
    }

    pub(crate) async fn set_definition_enabled(&self, job: &Job, enabled: bool) -> PipelineResult<()> {
        let patch = json!({"spec": {"enabled": enabled}});
        retry_with_backoff(&self.options.patch_backoff, "enable_job", || {
            self.clients
                .scheduled_workflows
                .patch(&job.namespace, &job.name, &patch)
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            PipelineError::internal(
                e,
                format!(
                    "Failed to enable/disable job CR. Enabled: {enabled}, jobID: {}",
                    job.id
                ),
            )
        })
    }

    /// Hides the job, removes its recurring definition and then its row.
    #[instrument(skip(self))]
    pub async fn delete_job(&self, id: &str) -> PipelineResult<()> {
        let job = self.get_job(id).await.context("Delete job failed")?;
        self.stores
            .jobs
            .update_status(id, JobStatus::Deleting)
            .await
            .context("Delete job failed")?;

        match self
            .clients
            .scheduled_workflows
            .delete(&job.namespace, &job.name)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(job_id = %id, name = %job.name, namespace = %job.namespace, "Recurring definition already gone");
            }
            Err(e) => {
                // The definition is still live, so the row must stay visible.
                if let Err(restore) = self.stores.jobs.update_status(id, JobStatus::Ready).await {
                    warn!(job_id = %id, error = %restore, "Failed to restore job row after definition delete failure");
                }
                return Err(PipelineError::internal(e, "Delete job CR failed"));
            }
        }

        if let Err(e) = self.stores.jobs.delete(id).await {
            warn!(job_id = %id, error = %e, "Failed to delete job row; it stays hidden in Deleting state");
        }
        Ok(())
    }

    /// Folds the controller's view of a recurring definition into its row.
    #[instrument(skip(self, definition), fields(job_id = %definition.metadata.uid))]
    pub async fn report_scheduled_workflow(
        &self,
        definition: &ScheduledWorkflow,
    ) -> PipelineResult<()> {
        let id = &definition.metadata.uid;
        if id.is_empty() {
            return Err(PipelineError::invalid_input(format!(
                "ScheduledWorkflow[{}] missing UID",
                definition.metadata.name
            )));
        }
        let mut job = self.get_job(id).await?;
        job.enabled = definition.spec.enabled;
        job.conditions = definition.condition();
        job.trigger = Trigger::from(&definition.spec.trigger);
        if let Some(max_concurrency) = definition.spec.max_concurrency {
            job.max_concurrency = max_concurrency;
        }
        if let Some(no_catchup) = definition.spec.no_catchup {
            job.no_catchup = no_catchup;
        }
        job.updated_at = self.now();
        self.stores.jobs.update_from_report(&job).await
    }
}
