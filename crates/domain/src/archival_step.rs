//! Appends the artifact/log archival step to each task of an execution
//! object. Purely additive: existing steps, volumes and mounts are kept in
//! order.

use std::collections::BTreeMap;

use pipeline_core::constants::{
    ARTIFACT_SECRET_ACCESS_KEY, ARTIFACT_SECRET_NAME, ARTIFACT_SECRET_SECRET_KEY,
    DEFAULT_COPY_STEP_NAME,
};
use pipeline_core::ManagerOptions;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::workflow::Workflow;

/// Artifact pairs per task name, as declared by the artifact-items annotation.
pub type ArtifactItems = BTreeMap<String, Vec<Vec<Value>>>;

const LOG_HOST_PATHS: [(&str, &str, bool); 4] = [
    ("varlog", "/var/log", false),
    ("varlibdockercontainers", "/var/lib/docker/containers", true),
    ("varlibkubeletpods", "/var/lib/kubelet/pods", true),
    ("varlogpods", "/var/log/pods", true),
];

pub fn inject_archival_steps(workflow: &mut Workflow, items: &ArtifactItems, options: &ManagerOptions) {
    let workflow_name = workflow.name().to_string();

    for task in workflow.tasks_mut() {
        let artifacts = items.get(&task.name).map(Vec::as_slice).unwrap_or_default();
        let has_artifacts = !artifacts.is_empty();

        let needed = (has_artifacts && options.track_artifacts)
            || options.archive_logs
            || (has_artifacts && options.strip_eof);
        if !needed {
            continue;
        }
        let Some(task_spec) = task.task_spec.as_mut() else {
            debug!(task = %task.name, "Task has no embedded spec, skipping archival step");
            continue;
        };

        if options.archive_logs {
            for (name, path, _) in LOG_HOST_PATHS {
                task_spec
                    .volumes
                    .push(json!({"name": name, "hostPath": {"path": path}}));
            }
            let step_template = task_spec
                .step_template
                .get_or_insert_with(|| Value::Object(Map::new()));
            append_log_mounts(step_template);
        }

        let mut script = options.artifact_script.clone();
        if options.inject_default_script {
            script = default_script(&workflow_name, script, artifacts, options);
        }

        task_spec.steps.push(archival_container(script, options));
    }
}

fn append_log_mounts(step_template: &mut Value) {
    let Some(template) = step_template.as_object_mut() else {
        warn!("Step template is not an object, log mounts not added");
        return;
    };
    let mounts = template
        .entry("volumeMounts")
        .or_insert_with(|| Value::Array(Vec::new()));
    if mounts.is_null() {
        *mounts = Value::Array(Vec::new());
    }
    if let Some(mounts) = mounts.as_array_mut() {
        for (name, path, read_only) in LOG_HOST_PATHS {
            let mut mount = json!({"name": name, "mountPath": path});
            if read_only {
                mount["readOnly"] = Value::Bool(true);
            }
            mounts.push(mount);
        }
    }
}

fn pair_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn default_script(
    workflow_name: &str,
    mut script: String,
    artifacts: &[Vec<Value>],
    options: &ManagerOptions,
) -> String {
    script.push('\n');
    if options.archive_logs {
        script.push_str("push_log\n");
    }

    let mut emit = |command: &str| {
        for artifact in artifacts {
            if let [name, path] = artifact.as_slice() {
                script.push_str(&format!("{command} {} {}\n", pair_part(name), pair_part(path)));
            } else {
                warn!(workflow = workflow_name, "Artifact annotations are missing for run");
            }
        }
    };
    if options.track_artifacts {
        emit("push_artifact");
    }
    // Runs after upload; only parameter outputs are affected.
    if options.strip_eof {
        emit("strip_eof");
    }
    script
}

fn field_env(name: &str, field_path: &str) -> Value {
    json!({"name": name, "valueFrom": {"fieldRef": {"fieldPath": field_path}}})
}

fn secret_env(name: &str, key: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": {"secretKeyRef": {"name": ARTIFACT_SECRET_NAME, "key": key}}
    })
}

fn archival_container(script: String, options: &ManagerOptions) -> Value {
    let mut container = match &options.copy_step_template {
        Some(Value::Object(template)) => template.clone(),
        _ => Map::new(),
    };

    let is_blank = |v: Option<&Value>| v.and_then(Value::as_str).map_or(true, str::is_empty);
    if is_blank(container.get("name")) {
        container.insert("name".to_string(), json!(DEFAULT_COPY_STEP_NAME));
    }
    if is_blank(container.get("image")) {
        container.insert("image".to_string(), json!(options.artifact_image));
    }

    let env = container
        .entry("env")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !env.is_array() {
        *env = Value::Array(Vec::new());
    }
    if let Some(env) = env.as_array_mut() {
        env.extend([
            field_env("ARTIFACT_BUCKET", "metadata.annotations['tekton.dev/artifact_bucket']"),
            field_env("ARTIFACT_ENDPOINT", "metadata.annotations['tekton.dev/artifact_endpoint']"),
            field_env(
                "ARTIFACT_ENDPOINT_SCHEME",
                "metadata.annotations['tekton.dev/artifact_endpoint_scheme']",
            ),
            field_env("ARTIFACT_ITEMS", "metadata.annotations['tekton.dev/artifact_items']"),
            field_env("PIPELINETASK", "metadata.labels['tekton.dev/pipelineTask']"),
            field_env("PIPELINERUN", "metadata.labels['tekton.dev/pipelineRun']"),
            field_env("PODNAME", "metadata.name"),
            field_env("NAMESPACE", "metadata.namespace"),
            secret_env("AWS_ACCESS_KEY_ID", ARTIFACT_SECRET_ACCESS_KEY),
            secret_env("AWS_SECRET_ACCESS_KEY", ARTIFACT_SECRET_SECRET_KEY),
            json!({"name": "ARCHIVE_LOGS", "value": options.archive_logs.to_string()}),
            json!({"name": "TRACK_ARTIFACTS", "value": options.track_artifacts.to_string()}),
            json!({"name": "STRIP_EOF", "value": options.strip_eof.to_string()}),
        ]);
    }

    container.insert("script".to_string(), Value::String(script));
    Value::Object(container)
}
