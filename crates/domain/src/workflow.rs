//! Typed view over the one-shot execution object (a Tekton `PipelineRun`).
//!
//! Only the fields the control plane reads or rewrites are modelled; every
//! other field is carried through `extra` so a parse/serialize cycle never
//! drops controller-owned data.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use pipeline_core::constants::{
    LABEL_PERSISTED_FINAL_STATE, LABEL_RUN_ID, LABEL_SCHEDULED_AT, SCHEDULED_WORKFLOW_KIND,
    UID_PLACEHOLDERS, WORKFLOW_KIND,
};
use pipeline_core::{PipelineError, PipelineResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMeta {
    pub fn created_at(&self) -> i64 {
        self.creation_timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<PipelineSpecBody>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    /// Requested run state; the controller cancels on `PipelineRunCancelled`.
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpecBody {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<PipelineTask>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_spec: Option<EmbeddedTask>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskMetadata>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Value>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_template: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub task_runs: BTreeMap<String, TaskRunStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type", default)]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunStatus {
    #[serde(default)]
    pub pipeline_task_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskRunDetail>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunDetail {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub pod_name: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRunDetail {
    fn failed(&self) -> bool {
        succeeded_condition(&self.conditions).is_some_and(|c| c.status == "False")
    }
}

fn succeeded_condition(conditions: &[Condition]) -> Option<&Condition> {
    conditions.iter().find(|c| c.condition_type == "Succeeded")
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.timestamp())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
}

impl Workflow {
    /// Parses a template or stored manifest; JSON first, then YAML.
    pub fn from_bytes(bytes: &[u8]) -> PipelineResult<Self> {
        match serde_json::from_slice(bytes) {
            Ok(workflow) => Ok(workflow),
            Err(json_err) => serde_yaml::from_slice(bytes).map_err(|yaml_err| {
                PipelineError::Serialization(format!(
                    "Failed to parse workflow as JSON ({json_err}) or YAML ({yaml_err})"
                ))
            }),
        }
    }

    pub fn from_manifest(manifest: &str) -> PipelineResult<Self> {
        Self::from_bytes(manifest.as_bytes())
    }

    pub fn to_manifest(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_execution_kind(&self) -> bool {
        self.kind == WORKFLOW_KIND
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn set_label(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.labels.insert(key.to_string(), value.into());
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.annotations.insert(key.to_string(), value.into());
    }

    pub fn run_id(&self) -> Option<&str> {
        self.metadata.labels.get(LABEL_RUN_ID).map(String::as_str)
    }

    pub fn persisted_final_state(&self) -> bool {
        self.metadata
            .labels
            .get(LABEL_PERSISTED_FINAL_STATE)
            .is_some_and(|v| v == "true")
    }

    /// UID of the recurring definition that spawned this object, if any.
    pub fn scheduled_workflow_uid(&self) -> Option<&str> {
        self.metadata
            .owner_references
            .iter()
            .find(|o| o.kind == SCHEDULED_WORKFLOW_KIND && !o.uid.is_empty())
            .map(|o| o.uid.as_str())
    }

    /// Condition string stored on the run row.
    pub fn condition(&self) -> String {
        let Some(condition) = self
            .status
            .as_ref()
            .and_then(|s| succeeded_condition(&s.conditions))
        else {
            return "Running".to_string();
        };
        let fallback = match condition.status.as_str() {
            "True" => return "Succeeded".to_string(),
            "False" => "Failed",
            _ => "Running",
        };
        if condition.reason.is_empty() {
            fallback.to_string()
        } else {
            condition.reason.clone()
        }
    }

    pub fn is_in_final_state(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| succeeded_condition(&s.conditions))
            .is_some_and(|c| c.status == "True" || c.status == "False")
    }

    pub fn finished_at(&self) -> i64 {
        self.status
            .as_ref()
            .and_then(|s| s.completion_time.as_deref())
            .and_then(parse_timestamp)
            .unwrap_or(0)
    }

    pub fn scheduled_at_or_zero(&self) -> i64 {
        self.metadata
            .labels
            .get(LABEL_SCHEDULED_AT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Names declared by the run-level params and the embedded pipeline spec.
    pub fn declared_parameters(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.spec.params.iter().map(|p| p.name.clone()).collect();
        if let Some(pipeline_spec) = &self.spec.pipeline_spec {
            names.extend(pipeline_spec.params.iter().map(|p| p.name.clone()));
        }
        names
    }

    pub fn verify_parameters(&self, parameters: &BTreeMap<String, String>) -> PipelineResult<()> {
        let declared = self.declared_parameters();
        for name in parameters.keys() {
            if !declared.contains(name) {
                return Err(PipelineError::invalid_input(format!(
                    "Unrecognized input parameter: {name}"
                )));
            }
        }
        Ok(())
    }

    pub fn override_parameters(&mut self, parameters: &BTreeMap<String, String>) {
        for (name, value) in parameters {
            match self.spec.params.iter_mut().find(|p| &p.name == name) {
                Some(param) => param.value = Value::String(value.clone()),
                None => self.spec.params.push(Param {
                    name: name.clone(),
                    value: Value::String(value.clone()),
                }),
            }
        }
    }

    /// String-valued run parameters. Array values are skipped.
    pub fn parameters_as_map(&self) -> BTreeMap<String, String> {
        self.spec
            .params
            .iter()
            .filter_map(|p| p.value.as_str().map(|v| (p.name.clone(), v.to_string())))
            .collect()
    }

    pub fn parameters_json(&self) -> PipelineResult<String> {
        let params: Vec<_> = self
            .parameters_as_map()
            .into_iter()
            .map(|(name, value)| serde_json::json!({"name": name, "value": value}))
            .collect();
        Ok(serde_json::to_string(&params)?)
    }

    /// Declared parameters with their defaults, as stored on pipeline rows.
    /// Run-level values win over pipeline-level defaults.
    pub fn template_parameters_json(&self) -> PipelineResult<String> {
        let mut params = self.parameters_as_map();
        if let Some(pipeline_spec) = &self.spec.pipeline_spec {
            for param in &pipeline_spec.params {
                let default = param
                    .extra
                    .get("default")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                params
                    .entry(param.name.clone())
                    .or_insert_with(|| default.to_string());
            }
        }
        let params: Vec<_> = params
            .into_iter()
            .map(|(name, value)| serde_json::json!({"name": name, "value": value}))
            .collect();
        Ok(serde_json::to_string(&params)?)
    }

    /// Labels the object and every embedded task so step pods carry it.
    pub fn set_label_on_all_tasks(&mut self, key: &str, value: &str) {
        self.set_label(key, value);
        if let Some(pipeline_spec) = self.spec.pipeline_spec.as_mut() {
            for task in &mut pipeline_spec.tasks {
                if let Some(task_spec) = task.task_spec.as_mut() {
                    task_spec
                        .metadata
                        .get_or_insert_with(TaskMetadata::default)
                        .labels
                        .insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    /// Rewrites self-reference placeholders anywhere in the object.
    pub fn replace_uid(&mut self, run_id: &str) -> PipelineResult<()> {
        let mut manifest = self.to_manifest()?;
        for placeholder in UID_PLACEHOLDERS {
            manifest = manifest.replace(placeholder, run_id);
        }
        *self = serde_json::from_str(&manifest)?;
        Ok(())
    }

    /// The object without its status or server-assigned metadata, as stored
    /// for replay on runs spawned by a recurring definition.
    pub fn spec_manifest(&self) -> PipelineResult<String> {
        let trimmed = Workflow {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            metadata: ObjectMeta {
                name: self.metadata.name.clone(),
                generate_name: self.metadata.generate_name.clone(),
                ..ObjectMeta::default()
            },
            spec: self.spec.clone(),
            status: None,
        };
        trimmed.to_manifest()
    }

    /// Prepares a finished object for resubmission and returns the pods of
    /// failed task runs, which must be deleted before the retry starts.
    pub fn sanitize_for_retry(&mut self) -> Vec<String> {
        self.metadata.uid.clear();
        self.metadata.creation_timestamp = None;
        self.metadata.labels.remove(LABEL_PERSISTED_FINAL_STATE);
        self.spec.status.clear();

        let mut pods = Vec::new();
        if let Some(status) = self.status.as_mut() {
            status.conditions.clear();
            status.completion_time = None;
            status.start_time = None;
            status.task_runs.retain(|_, task_run| match &task_run.status {
                Some(detail) if detail.failed() => {
                    if !detail.pod_name.is_empty() {
                        pods.push(detail.pod_name.clone());
                    }
                    false
                }
                _ => true,
            });
        }
        pods
    }

    /// Task run entry addressed either by its own name or by its pod name.
    pub fn find_task_run(&self, node_id: &str) -> Option<(&str, &TaskRunStatus)> {
        let status = self.status.as_ref()?;
        status
            .task_runs
            .iter()
            .find(|(name, run)| {
                name.as_str() == node_id
                    || run.status.as_ref().is_some_and(|d| d.pod_name == node_id)
            })
            .map(|(name, run)| (name.as_str(), run))
    }

    /// Object-store key of an archived task artifact, if the node exists.
    pub fn artifact_key(&self, node_id: &str, artifact_name: &str) -> Option<String> {
        let (task_run_name, task_run) = self.find_task_run(node_id)?;
        let task = if task_run.pipeline_task_name.is_empty() {
            task_run_name
        } else {
            task_run.pipeline_task_name.as_str()
        };
        Some(format!(
            "artifacts/{}/{}/{}.tgz",
            self.metadata.name, task, artifact_name
        ))
    }

    /// Every task whose embedded spec can receive extra steps.
    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut PipelineTask> + '_ {
        self.spec
            .pipeline_spec
            .iter_mut()
            .flat_map(|p| p.tasks.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finished_workflow(status: &str, reason: &str) -> Workflow {
        serde_json::from_value(json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "PipelineRun",
            "metadata": {
                "name": "train-abcde",
                "namespace": "ml",
                "uid": "uid-1",
                "resourceVersion": "42",
                "creationTimestamp": "2024-01-02T03:04:05Z",
                "labels": {"pipeline/runid": "run-1", "pipeline/persistedFinalState": "true"}
            },
            "spec": {"status": "PipelineRunCancelled", "timeout": "1h"},
            "status": {
                "conditions": [{"type": "Succeeded", "status": status, "reason": reason}],
                "startTime": "2024-01-02T03:04:05Z",
                "completionTime": "2024-01-02T03:14:05Z",
                "taskRuns": {
                    "train-abcde-prep": {
                        "pipelineTaskName": "prep",
                        "status": {"podName": "prep-pod", "conditions": [{"type": "Succeeded", "status": "True"}]}
                    },
                    "train-abcde-fit": {
                        "pipelineTaskName": "fit",
                        "status": {"podName": "fit-pod", "conditions": [{"type": "Succeeded", "status": "False"}]}
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_condition_mapping() {
        assert_eq!(finished_workflow("True", "Succeeded").condition(), "Succeeded");
        assert_eq!(finished_workflow("False", "").condition(), "Failed");
        assert_eq!(
            finished_workflow("False", "PipelineRunCancelled").condition(),
            "PipelineRunCancelled"
        );
        assert_eq!(finished_workflow("Unknown", "").condition(), "Running");
        assert_eq!(Workflow::default().condition(), "Running");
    }

    #[test]
    fn test_final_state_and_timestamps() {
        let workflow = finished_workflow("False", "Failed");
        assert!(workflow.is_in_final_state());
        assert!(workflow.persisted_final_state());
        assert_eq!(workflow.finished_at(), 1704165245);
        assert_eq!(workflow.metadata.created_at(), 1704164645);
        assert!(!finished_workflow("Unknown", "Running").is_in_final_state());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let workflow = finished_workflow("True", "Succeeded");
        let reparsed = Workflow::from_manifest(&workflow.to_manifest().unwrap()).unwrap();
        assert_eq!(reparsed.spec.extra.get("timeout"), Some(&json!("1h")));
        assert_eq!(reparsed, workflow);
    }

    #[test]
    fn test_sanitize_for_retry_drops_failed_task_runs() {
        let mut workflow = finished_workflow("False", "Failed");
        let pods = workflow.sanitize_for_retry();

        assert_eq!(pods, vec!["fit-pod".to_string()]);
        assert!(workflow.metadata.uid.is_empty());
        assert!(workflow.metadata.creation_timestamp.is_none());
        assert!(!workflow.persisted_final_state());
        assert!(workflow.spec.status.is_empty());
        let status = workflow.status.as_ref().unwrap();
        assert!(status.conditions.is_empty());
        assert!(status.completion_time.is_none());
        assert_eq!(status.task_runs.len(), 1);
        assert!(status.task_runs.contains_key("train-abcde-prep"));
        assert_eq!(workflow.metadata.resource_version, "42");
    }

    #[test]
    fn test_yaml_template_is_accepted() {
        let yaml = r#"
apiVersion: tekton.dev/v1beta1
kind: PipelineRun
metadata:
  name: hello
  labels: null
spec:
  params:
    - name: x
      value: "1"
  pipelineSpec:
    params:
      - name: y
        default: "2"
    tasks:
      - name: echo
        taskSpec:
          steps:
            - name: main
              image: busybox
"#;
        let workflow = Workflow::from_bytes(yaml.as_bytes()).unwrap();
        assert!(workflow.is_execution_kind());
        let declared: Vec<_> = workflow.declared_parameters().into_iter().collect();
        assert_eq!(declared, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_scheduled_workflow_owner() {
        let workflow: Workflow = serde_json::from_value(json!({
            "kind": "PipelineRun",
            "metadata": {
                "name": "nightly-1",
                "ownerReferences": [{"apiVersion": "kubeflow.org/v1beta1", "kind": "ScheduledWorkflow", "name": "nightly", "uid": "job-uid"}],
                "labels": {"scheduledworkflows.kubeflow.org/workflowEpoch": "1700000000"}
            }
        }))
        .unwrap();
        assert_eq!(workflow.scheduled_workflow_uid(), Some("job-uid"));
        assert_eq!(workflow.scheduled_at_or_zero(), 1700000000);
    }

    #[test]
    fn test_artifact_key_by_pod_name() {
        let workflow = finished_workflow("True", "Succeeded");
        assert_eq!(
            workflow.artifact_key("fit-pod", "model").as_deref(),
            Some("artifacts/train-abcde/fit/model.tgz")
        );
        assert!(workflow.artifact_key("missing", "model").is_none());
    }

    #[test]
    fn test_template_parameters_include_pipeline_defaults() {
        let workflow: Workflow = serde_json::from_value(json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "PipelineRun",
            "metadata": {"generateName": "train-"},
            "spec": {
                "params": [{"name": "epochs", "value": "5"}],
                "pipelineSpec": {
                    "params": [
                        {"name": "epochs", "default": "1"},
                        {"name": "lr", "default": "0.1"}
                    ],
                    "tasks": []
                }
            }
        }))
        .unwrap();
        let params: Value =
            serde_json::from_str(&workflow.template_parameters_json().unwrap()).unwrap();
        assert_eq!(
            params,
            json!([{"name": "epochs", "value": "5"}, {"name": "lr", "value": "0.1"}])
        );
    }
}
