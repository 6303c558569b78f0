//! Task log retrieval: the live pod first, the archive after the pod is gone.

use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{Run, Workflow};
use tracing::{debug, instrument, warn};

use crate::ResourceManager;

/// Container running the user step in every task pod.
const MAIN_CONTAINER: &str = "step-main";

impl ResourceManager {
    #[instrument(skip(self))]
    pub async fn read_log(&self, run_id: &str, node_id: &str, follow: bool) -> PipelineResult<Vec<u8>> {
        let run = self.get_run(run_id).await.map_err(|e| {
            PipelineError::BadRequest(format!("Run does not exist, log cannot be read: {e}"))
        })?;

        match self
            .clients
            .pods
            .read_log(&run.namespace, node_id, MAIN_CONTAINER, follow)
            .await
        {
            Ok(log) => Ok(log),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(run_id, node_id, error = %e, "Failed to access pod log");
                }
                debug!(run_id, node_id, "Falling back to archived log");
                self.read_archived_log(&run, node_id).await
            }
        }
    }

    async fn read_archived_log(&self, run: &Run, node_id: &str) -> PipelineResult<Vec<u8>> {
        if run.workflow_runtime_manifest.is_empty() {
            return Err(PipelineError::BadRequest(
                "Failed to retrieve the runtime workflow from the run, archived log cannot be read"
                    .to_string(),
            ));
        }
        let workflow = Workflow::from_manifest(&run.workflow_runtime_manifest).map_err(|e| {
            PipelineError::internal(e, "Failed to retrieve the runtime pipeline spec from the run")
        })?;
        let key = self.clients.log_archive.log_object_key(&workflow, node_id)?;
        let archived = self
            .clients
            .object_store
            .get(&key)
            .await
            .map_err(|e| PipelineError::internal(e, "Failed to retrieve the log file from archive"))?;
        self.clients
            .log_archive
            .extract_log(&archived)
            .map_err(|e| PipelineError::internal(e, "error in streaming the log"))
    }
}
