//! Resubmission of a finished run.
//!
//! Each attempt walks `Loaded -> Sanitized -> PatchAttempted ->
//! {Patched | CreateAttempted} -> Persisted`. The run keeps its id, name
//! and references; only condition, manifest and finish time change.

use pipeline_core::{PipelineError, PipelineResult, ResultExt};
use pipeline_domain::Workflow;
use tracing::{debug, info, instrument, warn};

use crate::metrics::record_run_retried;
use crate::ResourceManager;

/// Progress of one retry attempt.
#[derive(Debug)]
pub enum RetryState {
    /// Last runtime manifest read from the run row.
    Loaded { workflow: Workflow },
    /// Server-assigned state stripped; failed pods already deleted.
    Sanitized { workflow: Workflow },
    /// In-place update tried against the live object.
    PatchAttempted {
        workflow: Workflow,
        update: PipelineResult<Workflow>,
    },
    Patched { workflow: Workflow },
    /// Fresh object created after the update failed.
    CreateAttempted { workflow: Workflow },
    Persisted,
}

impl RetryState {
    pub fn name(&self) -> &'static str {
        match self {
            RetryState::Loaded { .. } => "Loaded",
            RetryState::Sanitized { .. } => "Sanitized",
            RetryState::PatchAttempted { .. } => "PatchAttempted",
            RetryState::Patched { .. } => "Patched",
            RetryState::CreateAttempted { .. } => "CreateAttempted",
            RetryState::Persisted => "Persisted",
        }
    }
}

impl ResourceManager {
    #[instrument(skip(self))]
    pub async fn retry_run(&self, run_id: &str) -> PipelineResult<()> {
        let run = self.get_run(run_id).await.context("Retry run failed")?;
        let namespace = run.namespace.clone();

        if run.workflow_runtime_manifest.is_empty() {
            return Err(PipelineError::BadRequest(
                "Workflow must be Failed/Error to retry".to_string(),
            ));
        }
        let workflow = Workflow::from_manifest(&run.workflow_runtime_manifest).map_err(|e| {
            PipelineError::internal(e, "Failed to retrieve the runtime pipeline spec from the run")
        })?;

        let mut state = RetryState::Loaded { workflow };
        loop {
            debug!(run_id, state = state.name(), "Retry step");
            state = match state {
                RetryState::Loaded { mut workflow } => {
                    let pods = workflow.sanitize_for_retry();
                    self.delete_failed_pods(&namespace, &pods).await?;
                    RetryState::Sanitized { workflow }
                }
                RetryState::Sanitized { workflow } => {
                    let update = self.update_live_workflow(&namespace, &workflow).await;
                    RetryState::PatchAttempted { workflow, update }
                }
                RetryState::PatchAttempted {
                    workflow: _,
                    update: Ok(updated),
                } => RetryState::Patched { workflow: updated },
                RetryState::PatchAttempted {
                    mut workflow,
                    update: Err(update_error),
                } => {
                    warn!(run_id, error = %update_error, "Updating the execution object failed, creating a new one");
                    workflow.metadata.resource_version.clear();
                    match self.clients.workflows.create(&namespace, &workflow).await {
                        Ok(created) => RetryState::CreateAttempted { workflow: created },
                        Err(create_error) => {
                            return Err(PipelineError::internal(
                                PipelineError::Aggregate(vec![update_error, create_error]),
                                "Retry run failed. Failed to create or update the run",
                            ));
                        }
                    }
                }
                RetryState::Patched { workflow } | RetryState::CreateAttempted { workflow } => {
                    self.stores
                        .runs
                        .update(run_id, &workflow.condition(), 0, &workflow.to_manifest()?)
                        .await
                        .map_err(|e| {
                            PipelineError::internal(e, "Failed to update the database entry")
                        })?;
                    RetryState::Persisted
                }
                RetryState::Persisted => break,
            };
        }

        record_run_retried(&namespace);
        info!(run_id, "Run resubmitted");
        Ok(())
    }

    async fn delete_failed_pods(&self, namespace: &str, pods: &[String]) -> PipelineResult<()> {
        for pod in pods {
            self.clients
                .pods
                .delete_pod(namespace, pod)
                .await
                .map_err(|e| {
                    PipelineError::internal(
                        e,
                        "Retry run failed. Failed to clean up the failed pods from previous run",
                    )
                })?;
        }
        Ok(())
    }

    /// Read-modify-write: refresh the resource version from the live object
    /// before replacing it.
    async fn update_live_workflow(
        &self,
        namespace: &str,
        workflow: &Workflow,
    ) -> PipelineResult<Workflow> {
        let latest = self.clients.workflows.get(namespace, workflow.name()).await?;
        let mut replacement = workflow.clone();
        replacement.metadata.resource_version = latest.metadata.resource_version;
        self.clients.workflows.update(namespace, &replacement).await
    }
}
