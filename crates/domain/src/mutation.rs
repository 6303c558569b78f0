//! Turns a parsed template into a submission-ready execution object.
//!
//! Every stage is a plain function over [`Workflow`]; the flags that select
//! optional stages arrive through [`ManagerOptions`] so the whole pipeline is
//! deterministic for a given input.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use pipeline_core::constants::{
    ANNOTATION_ARTIFACT_BUCKET, ANNOTATION_ARTIFACT_ENDPOINT, ANNOTATION_ARTIFACT_ENDPOINT_SCHEME,
    ANNOTATION_ARTIFACT_ITEMS, ANNOTATION_ISTIO_SIDECAR_INJECT,
    ANNOTATION_ISTIO_SIDECAR_INJECT_DISABLED, ANNOTATION_RESOURCE_TEMPLATES, ANNOTATION_RUN_NAME,
    CACHE_DISABLED, LABEL_CACHE_ENABLED, LABEL_RUN_ID, MACRO_CURRENT_TIME, MACRO_RUN_UUID,
    MACRO_SCHEDULED_TIME,
};
use pipeline_core::{ManagerOptions, PipelineError, PipelineResult, ResultExt};

use crate::archival_step::{inject_archival_steps, ArtifactItems};
use crate::custom_resources::{parse_custom_resources, CustomResource};
use crate::workflow::Workflow;

/// Identity of the run being created. Absent when preparing the template of
/// a recurring definition.
#[derive(Debug, Clone)]
pub struct RunIdentity<'a> {
    pub run_id: &'a str,
    pub run_name: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MutationRequest<'a> {
    pub parameters: &'a BTreeMap<String, String>,
    pub service_account: &'a str,
    pub run: Option<RunIdentity<'a>>,
}

#[derive(Debug, Clone)]
pub struct MutatedWorkflow {
    pub workflow: Workflow,
    /// Custom resources to upsert before submission.
    pub custom_resources: Vec<CustomResource>,
}

pub fn mutate(
    template: &[u8],
    request: &MutationRequest<'_>,
    options: &ManagerOptions,
) -> PipelineResult<MutatedWorkflow> {
    let mut workflow = Workflow::from_bytes(template).map_err(|e| {
        PipelineError::internal(e, "Failed to unmarshal workflow spec manifest")
    })?;
    if !workflow.is_execution_kind() {
        return Err(PipelineError::Internal(format!(
            "Template kind '{}' is not an execution object",
            workflow.kind
        )));
    }

    workflow
        .verify_parameters(request.parameters)
        .context("Failed to verify parameters")?;

    if let Some(run) = &request.run {
        workflow.override_parameters(request.parameters);
        let formatted = format_macros(&workflow.parameters_as_map(), run);
        workflow.override_parameters(&formatted);
    }

    let service_account = options
        .resolve_service_account(request.service_account, &workflow.spec.service_account_name);
    workflow.spec.service_account_name = service_account;

    workflow.set_annotation(
        ANNOTATION_ISTIO_SIDECAR_INJECT,
        ANNOTATION_ISTIO_SIDECAR_INJECT_DISABLED,
    );

    if !options.is_cache_enabled() {
        workflow.set_label_on_all_tasks(LABEL_CACHE_ENABLED, CACHE_DISABLED);
    }

    apply_system_defaults(&mut workflow, &options.system_default_parameters);

    if let Some(run) = &request.run {
        workflow.set_label(LABEL_RUN_ID, run.run_id);
        workflow.set_annotation(ANNOTATION_RUN_NAME, run.run_name);
        workflow
            .replace_uid(run.run_id)
            .map_err(|e| PipelineError::internal(e, "Failed to replace workflow ID"))?;
        suffix_name(&mut workflow, run.run_id);
    }

    let custom_resources = match workflow.metadata.annotations.get(ANNOTATION_RESOURCE_TEMPLATES) {
        Some(raw) if options.apply_custom_resources => {
            parse_custom_resources(raw).context("Apply custom resources failed")?
        }
        _ => Vec::new(),
    };

    prepare_archival(&mut workflow, options)?;

    Ok(MutatedWorkflow {
        workflow,
        custom_resources,
    })
}

/// Expands run macros in parameter values. Only changed entries are returned.
fn format_macros(
    parameters: &BTreeMap<String, String>,
    run: &RunIdentity<'_>,
) -> BTreeMap<String, String> {
    let now = run.created_at.format("%Y%m%d%H%M%S").to_string();
    parameters
        .iter()
        .filter_map(|(name, value)| {
            let expanded = value
                .replace(MACRO_RUN_UUID, run.run_id)
                .replace(MACRO_CURRENT_TIME, &now)
                .replace(MACRO_SCHEDULED_TIME, &now);
            (&expanded != value).then(|| (name.clone(), expanded))
        })
        .collect()
}

/// Fills declared parameters that are still empty with the system default.
fn apply_system_defaults(workflow: &mut Workflow, defaults: &HashMap<String, String>) {
    if defaults.is_empty() {
        return;
    }
    let declared = workflow.declared_parameters();
    let current = workflow.parameters_as_map();
    let fills: BTreeMap<String, String> = defaults
        .iter()
        .filter(|(name, _)| declared.contains(*name))
        .filter(|(name, _)| current.get(*name).map_or(true, String::is_empty))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    workflow.override_parameters(&fills);
}

fn suffix_name(workflow: &mut Workflow, run_id: &str) {
    let base = if workflow.metadata.name.is_empty() {
        workflow.metadata.generate_name.trim_end_matches('-').to_string()
    } else {
        workflow.metadata.name.clone()
    };
    let prefix: String = run_id.chars().take(5).collect();
    workflow.metadata.name = format!("{base}-{prefix}");
    workflow.metadata.generate_name.clear();
}

fn prepare_archival(workflow: &mut Workflow, options: &ManagerOptions) -> PipelineResult<()> {
    workflow.set_annotation(ANNOTATION_ARTIFACT_BUCKET, options.artifact_bucket.clone());
    workflow.set_annotation(ANNOTATION_ARTIFACT_ENDPOINT, options.artifact_endpoint.clone());
    workflow.set_annotation(
        ANNOTATION_ARTIFACT_ENDPOINT_SCHEME,
        options.artifact_endpoint_scheme.clone(),
    );

    let Some(raw) = workflow.metadata.annotations.get(ANNOTATION_ARTIFACT_ITEMS) else {
        return Ok(());
    };
    let items: ArtifactItems = serde_json::from_str(raw)
        .map_err(|e| PipelineError::internal(e, "Failed to parse artifact items annotation"))?;
    inject_archival_steps(workflow, &items, options);
    Ok(())
}
