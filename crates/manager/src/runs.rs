//! One-shot runs: submission, lookup, archival, termination and deletion.

use pipeline_core::constants::WORKFLOW_CANCEL_STATUS;
use pipeline_core::{retry_with_backoff, PipelineError, PipelineResult, ResultExt};
use pipeline_domain::{
    find_reference, mutate, FilterContext, ListOptions, ListPage, MutationRequest,
    PipelineSpecRecord, Relationship, ResourceRef, ResourceReference, ResourceType, Run,
    RunIdentity, RunMetric, RunRequest, StorageState, Workflow,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::metrics::record_run_created;
use crate::ResourceManager;

/// Converts request references into stored edges of `resource_id`.
pub(crate) fn to_model_references(
    resource_id: &str,
    resource_type: ResourceType,
    references: &[ResourceRef],
) -> Vec<ResourceReference> {
    references
        .iter()
        .map(|r| ResourceReference {
            resource_id: resource_id.to_string(),
            resource_type,
            reference_id: r.key.id.clone(),
            reference_name: r.name.clone(),
            reference_type: r.key.resource_type,
            relationship: r.relationship,
        })
        .collect()
}

impl ResourceManager {
    /// Submits a new execution object and records it as a run.
    ///
    /// The row is written only after the cluster accepted the object, from
    /// the fields the server returned. A failed row write leaves the object
    /// behind; its status reports then fail until it is collected.
    #[instrument(skip(self, request), fields(run_name = %request.name))]
    pub async fn create_run(&self, request: &RunRequest) -> PipelineResult<Run> {
        let mut references = request.resource_references.clone();
        let template = self
            .resolve_template(&request.pipeline_spec, &mut references)
            .await?;

        let run_id = self.new_id();
        let created_at = self.clients.clock.now();
        let parameters = request.pipeline_spec.parameters_map();
        let mutation = MutationRequest {
            parameters: &parameters,
            service_account: &request.service_account,
            run: Some(RunIdentity {
                run_id: &run_id,
                run_name: &request.name,
                created_at,
            }),
        };
        let mutated = mutate(&template, &mutation, &self.options)?;

        let references = self.ensure_owning_experiment(references).await?;
        let namespace = self.resolve_namespace(&references).await?;

        if !mutated.custom_resources.is_empty() {
            self.apply_custom_resources(&namespace, &mutated.custom_resources)
                .await
                .context("Apply custom resources failed")?;
        }

        let created = self
            .clients
            .workflows
            .create(&namespace, &mutated.workflow)
            .await
            .map_err(|e| {
                PipelineError::internal(
                    e,
                    format!("Failed to create a workflow for ({})", mutated.workflow.name()),
                )
            })?;
        info!(run_id = %run_id, workflow = %created.name(), namespace = %namespace, "Execution object created");

        let template_manifest = String::from_utf8_lossy(&template).into_owned();
        let run = self.run_from_created(
            request,
            &run_id,
            created_at.timestamp(),
            &created,
            template_manifest,
            &references,
        )?;
        let run = self
            .stores
            .runs
            .create(&run)
            .await
            .context("Failed to store run")?;
        record_run_created(&run.namespace);
        Ok(run)
    }

    fn run_from_created(
        &self,
        request: &RunRequest,
        run_id: &str,
        created_at: i64,
        created: &Workflow,
        template_manifest: String,
        references: &[ResourceRef],
    ) -> PipelineResult<Run> {
        let experiment_id = find_reference(references, ResourceType::Experiment, Relationship::Owner)
            .unwrap_or_default()
            .to_string();
        Ok(Run {
            id: run_id.to_string(),
            experiment_id,
            display_name: request.name.clone(),
            name: created.name().to_string(),
            storage_state: StorageState::Available,
            namespace: created.namespace().to_string(),
            service_account: created.spec.service_account_name.clone(),
            description: request.description.clone(),
            created_at,
            scheduled_at: created_at,
            finished_at: 0,
            conditions: created.condition(),
            pipeline_spec: PipelineSpecRecord {
                pipeline_id: request.pipeline_spec.pipeline_id.clone(),
                pipeline_name: request.pipeline_spec.pipeline_name.clone(),
                workflow_spec_manifest: template_manifest,
                parameters: created.parameters_json()?,
            },
            workflow_runtime_manifest: created.to_manifest()?,
            resource_references: to_model_references(run_id, ResourceType::Run, references),
        })
    }

    pub async fn get_run(&self, id: &str) -> PipelineResult<Run> {
        self.stores
            .runs
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("run", id))
    }

    pub async fn list_runs(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Run>> {
        self.stores.runs.list(filter, opts).await
    }

    pub async fn archive_run(&self, id: &str) -> PipelineResult<()> {
        self.stores.runs.archive(id).await
    }

    pub async fn unarchive_run(&self, id: &str) -> PipelineResult<()> {
        self.stores.runs.unarchive(id).await
    }

    /// Deletes the execution object when it is still there, then the row.
    #[instrument(skip(self))]
    pub async fn delete_run(&self, id: &str) -> PipelineResult<()> {
        let run = self.get_run(id).await.context("Delete run failed")?;
        if let Err(e) = self.clients.workflows.delete(&run.namespace, &run.name).await {
            warn!(run_id = %id, workflow = %run.name, error = %e, "Failed to delete execution object");
        }
        self.stores.runs.delete(id).await.context("Delete run failed")
    }

    /// Flips the row to terminating, then asks the controller to cancel.
    #[instrument(skip(self))]
    pub async fn terminate_run(&self, id: &str) -> PipelineResult<()> {
        let run = self.get_run(id).await.context("Terminate run failed")?;
        self.stores
            .runs
            .terminate(id)
            .await
            .context("Terminate run failed")?;

        let patch = json!({"spec": {"status": WORKFLOW_CANCEL_STATUS}});
        retry_with_backoff(&self.options.patch_backoff, "terminate_run", || {
            self.clients.workflows.patch(&run.namespace, &run.name, &patch)
        })
        .await
        .map_err(|e| PipelineError::internal(e, "Failed to terminate the run"))?;
        info!(run_id = %id, "Cancel requested");
        Ok(())
    }

    pub async fn report_run_metric(&self, run_id: &str, metric: &RunMetric) -> PipelineResult<()> {
        let metric = RunMetric {
            run_id: run_id.to_string(),
            ..metric.clone()
        };
        metric.validate()?;
        self.get_run(run_id).await?;
        self.stores.runs.report_metric(&metric).await
    }

    /// Reads an archived task artifact located through the run's runtime
    /// manifest.
    pub async fn read_artifact(
        &self,
        run_id: &str,
        node_id: &str,
        artifact_name: &str,
    ) -> PipelineResult<Vec<u8>> {
        let run = self.get_run(run_id).await?;
        let workflow = Workflow::from_manifest(&run.workflow_runtime_manifest).map_err(|e| {
            PipelineError::internal(e, format!("Failed to unmarshal workflow of run {run_id}"))
        })?;
        let key = workflow
            .artifact_key(node_id, artifact_name)
            .ok_or_else(|| {
                PipelineError::not_found(
                    "artifact",
                    format!("runs/{run_id}/nodes/{node_id}/artifacts/{artifact_name}"),
                )
            })?;
        self.clients.object_store.get(&key).await
    }
}
