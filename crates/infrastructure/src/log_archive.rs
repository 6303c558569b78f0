use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::ports::LogArchive;
use pipeline_domain::Workflow;

const MAIN_LOG_FILE: &str = "main.log";

/// Layout written by the injected archival step: one log object per task,
/// next to the task's artifacts, holding the container runtime's log lines.
#[derive(Debug, Clone, Default)]
pub struct PodLogArchive;

impl PodLogArchive {
    pub fn new() -> Self {
        Self
    }
}

impl LogArchive for PodLogArchive {
    fn log_object_key(&self, workflow: &Workflow, node_id: &str) -> PipelineResult<String> {
        if workflow.name().is_empty() {
            return Err(PipelineError::invalid_input(
                "Runtime workflow has no name, archived log cannot be located",
            ));
        }
        let task = match workflow.find_task_run(node_id) {
            Some((_, run)) if !run.pipeline_task_name.is_empty() => run.pipeline_task_name.as_str(),
            Some((name, _)) => name,
            None => node_id,
        };
        Ok(format!("artifacts/{}/{}/{}", workflow.name(), task, MAIN_LOG_FILE))
    }

    fn extract_log(&self, archived: &[u8]) -> PipelineResult<Vec<u8>> {
        let text = String::from_utf8_lossy(archived);
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            match parse_cri_line(line) {
                Some((true, message)) => out.push_str(message),
                Some((false, message)) => {
                    out.push_str(message);
                    out.push('\n');
                }
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(out.into_bytes())
    }
}

/// Splits `<timestamp> <stream> <tag> <message>`; returns whether the line is
/// a partial chunk together with its message.
fn parse_cri_line(line: &str) -> Option<(bool, &str)> {
    let mut parts = line.splitn(4, ' ');
    let timestamp = parts.next()?;
    let stream = parts.next()?;
    let tag = parts.next()?;
    let message = parts.next().unwrap_or("");
    let looks_like_timestamp =
        timestamp.len() >= 20 && timestamp.as_bytes()[4] == b'-' && timestamp.contains('T');
    if !looks_like_timestamp || !matches!(stream, "stdout" | "stderr") {
        return None;
    }
    match tag.split(':').next() {
        Some("P") => Some((true, message)),
        Some("F") => Some((false, message)),
        _ => None,
    }
}
