use pipeline_core::PipelineResult;

use crate::workflow::Workflow;

/// Locates and decodes logs archived by the injected archival step.
pub trait LogArchive: Send + Sync {
    fn log_object_key(&self, workflow: &Workflow, node_id: &str) -> PipelineResult<String>;
    fn extract_log(&self, archived: &[u8]) -> PipelineResult<Vec<u8>>;
}
