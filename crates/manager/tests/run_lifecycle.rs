mod common;

use common::{test_options, Harness};
use pipeline_core::constants::{ANNOTATION_RESOURCE_TEMPLATES, ANNOTATION_RUN_NAME, LABEL_RUN_ID};
use pipeline_core::{ErrorKind, ManagerOptions, PipelineError};
use pipeline_domain::{
    Parameter, PipelineSpec, Relationship, ResourceRef, ResourceType, RunMetric, RunRequest,
};
use pipeline_testing_utils::{
    workflow_template, workflow_template_manifest, ClusterOp, CustomResourceCall, RunBuilder,
    SequentialUuidGenerator, TEST_NAMESPACE,
};
use serde_json::json;

fn run_request(manifest: String, parameters: &[(&str, &str)]) -> RunRequest {
    RunRequest {
        name: "my run".to_string(),
        description: "first try".to_string(),
        pipeline_spec: PipelineSpec {
            workflow_manifest: manifest,
            parameters: parameters
                .iter()
                .map(|(name, value)| Parameter {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            ..PipelineSpec::default()
        },
        resource_references: vec![ResourceRef::new(
            ResourceType::Experiment,
            "exp-1",
            Relationship::Owner,
        )],
        service_account: String::new(),
    }
}

#[tokio::test]
async fn test_create_run_labels_object_and_stores_row() {
    let h = Harness::new().with_experiment();
    let run = h
        .manager
        .create_run(&run_request(workflow_template_manifest(), &[("x", "1")]))
        .await
        .unwrap();

    let run_id = SequentialUuidGenerator::nth(1).to_string();
    assert_eq!(run.id, run_id);
    assert_eq!(run.display_name, "my run");
    assert_eq!(run.conditions, "Running");
    assert_eq!(run.namespace, TEST_NAMESPACE);
    assert_eq!(run.experiment_id, "exp-1");
    assert_eq!(run.name, "hello-world-00000");

    let object = h.workflows.object(TEST_NAMESPACE, &run.name).unwrap();
    assert_eq!(object["metadata"]["labels"][LABEL_RUN_ID], json!(run_id));
    assert_eq!(object["metadata"]["annotations"][ANNOTATION_RUN_NAME], json!("my run"));
    assert_eq!(object["spec"]["params"][0], json!({"name": "x", "value": "1"}));

    let stored = h.store.run(&run_id).unwrap();
    assert_eq!(stored.conditions, "Running");
    assert!(stored
        .resource_references
        .iter()
        .any(|r| r.reference_type == ResourceType::Experiment
            && r.relationship == Relationship::Owner
            && r.reference_id == "exp-1"));
    assert!(stored.workflow_runtime_manifest.contains("wf-uid-1"));
}

#[tokio::test]
async fn test_create_run_rejects_undeclared_parameter_before_any_write() {
    let h = Harness::new().with_experiment();
    let err = h
        .manager
        .create_run(&run_request(workflow_template_manifest(), &[("z", "1")]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.workflows.calls_of(ClusterOp::Create).is_empty());
    assert_eq!(h.store.run_count(), 0);
}

#[tokio::test]
async fn test_create_run_without_experiment_uses_one_default_experiment() {
    let h = Harness::new();
    let mut request = run_request(workflow_template_manifest(), &[]);
    request.resource_references.clear();

    let first = h.manager.create_run(&request).await.unwrap();
    let second = h.manager.create_run(&request).await.unwrap();

    assert_eq!(h.store.experiment_count(), 1);
    assert!(!first.experiment_id.is_empty());
    assert_eq!(first.experiment_id, second.experiment_id);
    assert_eq!(first.namespace, TEST_NAMESPACE);
}

#[tokio::test]
async fn test_multi_user_mode_requires_an_experiment() {
    let h = Harness::with_options(ManagerOptions {
        multi_user_mode: true,
        ..test_options()
    });
    let mut request = run_request(workflow_template_manifest(), &[]);
    request.resource_references.clear();

    let err = h.manager.create_run(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.store.experiment_count(), 0);
    assert_eq!(h.workflows.object_count(), 0);
}

#[tokio::test]
async fn test_multi_user_mode_rejects_experiment_without_namespace() {
    let h = Harness::with_options(ManagerOptions {
        multi_user_mode: true,
        ..test_options()
    })
    .with_experiment();

    let err = h
        .manager
        .create_run(&run_request(workflow_template_manifest(), &[]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.workflows.object_count(), 0);
}

#[tokio::test]
async fn test_submission_failure_writes_no_row() {
    let h = Harness::new().with_experiment();
    h.workflows.fail(ClusterOp::Create, None, 500, None);

    let err = h
        .manager
        .create_run(&run_request(workflow_template_manifest(), &[]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.store.run_count(), 0);
}

#[tokio::test]
async fn test_row_write_failure_leaves_submitted_object() {
    let h = Harness::new().with_experiment();
    h.store.fail_on("run.create");

    let result = h
        .manager
        .create_run(&run_request(workflow_template_manifest(), &[]))
        .await;
    assert!(result.is_err());
    assert_eq!(h.workflows.object_count(), 1);
    assert_eq!(h.store.run_count(), 0);
}

#[tokio::test]
async fn test_create_run_from_pipeline_default_version() {
    let h = Harness::new().with_experiment();
    let pipeline = h
        .manager
        .create_pipeline("hello", "", "", workflow_template_manifest().as_bytes())
        .await
        .unwrap();

    let mut request = run_request(String::new(), &[("y", "2")]);
    request.pipeline_spec.pipeline_id = pipeline.id.clone();
    let run = h.manager.create_run(&request).await.unwrap();

    let version_ref = run
        .resource_references
        .iter()
        .find(|r| r.reference_type == ResourceType::PipelineVersion)
        .unwrap();
    assert_eq!(version_ref.reference_id, pipeline.id);
    assert_eq!(version_ref.relationship, Relationship::Creator);
    assert!(run.pipeline_spec.workflow_spec_manifest.contains("hello-world-"));
}

#[tokio::test]
async fn test_create_run_with_missing_version_is_not_found() {
    let h = Harness::new().with_experiment();
    let mut request = run_request(String::new(), &[]);
    request.resource_references.push(ResourceRef::new(
        ResourceType::PipelineVersion,
        "missing",
        Relationship::Creator,
    ));

    let err = h.manager.create_run(&request).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(h.workflows.object_count(), 0);
}

#[tokio::test]
async fn test_custom_resources_are_created_then_patched() {
    let h = Harness::with_options(ManagerOptions {
        apply_custom_resources: true,
        ..test_options()
    })
    .with_experiment();
    let mut template = workflow_template();
    template["metadata"]["annotations"] = json!({
        ANNOTATION_RESOURCE_TEMPLATES: r#"[{"apiVersion":"custom.tekton.dev/v1alpha1","kind":"PipelineLoop","metadata":{"name":"loop-1"},"spec":{"iterations":1}}]"#
    });

    h.manager
        .create_run(&run_request(template.to_string(), &[]))
        .await
        .unwrap();
    h.manager
        .create_run(&run_request(template.to_string(), &[]))
        .await
        .unwrap();

    let key = format!("custom.tekton.dev/v1alpha1/{TEST_NAMESPACE}/pipelineloops/loop-1");
    assert_eq!(
        h.custom_resources.calls(),
        vec![
            CustomResourceCall::Get(key.clone()),
            CustomResourceCall::Create(key.clone()),
            CustomResourceCall::Get(key.clone()),
            CustomResourceCall::MergePatch(key.clone()),
        ]
    );
}

#[tokio::test]
async fn test_malformed_custom_resource_fails_creation() {
    let h = Harness::with_options(ManagerOptions {
        apply_custom_resources: true,
        ..test_options()
    })
    .with_experiment();
    let mut template = workflow_template();
    template["metadata"]["annotations"] = json!({
        ANNOTATION_RESOURCE_TEMPLATES: r#"[{"apiVersion":"custom.tekton.dev/v1alpha1","metadata":{"name":"loop-1"}}]"#
    });

    let err = h
        .manager
        .create_run(&run_request(template.to_string(), &[]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.workflows.object_count(), 0);
}

#[tokio::test]
async fn test_terminate_flips_row_and_patches_cancel_status() {
    let h = Harness::new().with_experiment();
    let run = h
        .manager
        .create_run(&run_request(workflow_template_manifest(), &[]))
        .await
        .unwrap();
    h.workflows.fail(ClusterOp::Patch, None, 409, Some(2));

    h.manager.terminate_run(&run.id).await.unwrap();

    assert_eq!(h.store.run(&run.id).unwrap().conditions, "Terminating");
    assert_eq!(h.workflows.calls_of(ClusterOp::Patch).len(), 3);
    let object = h.workflows.object(TEST_NAMESPACE, &run.name).unwrap();
    assert_eq!(object["spec"]["status"], json!("PipelineRunCancelled"));
}

#[tokio::test]
async fn test_terminate_finished_run_is_rejected() {
    let h = Harness::new();
    h.store
        .insert_run(RunBuilder::new("run-1").with_condition("Succeeded").build());

    let err = h.manager.terminate_run("run-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.workflows.calls_of(ClusterOp::Patch).is_empty());
}

#[tokio::test]
async fn test_delete_run_tolerates_missing_object() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new("run-1").build());

    h.manager.delete_run("run-1").await.unwrap();

    assert!(h.store.run("run-1").is_none());
    assert_eq!(h.workflows.calls_of(ClusterOp::Delete).len(), 1);
}

#[tokio::test]
async fn test_archive_and_unarchive_run() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new("run-1").build());

    h.manager.archive_run("run-1").await.unwrap();
    assert_eq!(
        h.store.run("run-1").unwrap().storage_state,
        pipeline_domain::StorageState::Archived
    );
    h.manager.unarchive_run("run-1").await.unwrap();
    assert_eq!(
        h.store.run("run-1").unwrap().storage_state,
        pipeline_domain::StorageState::Available
    );
}

#[tokio::test]
async fn test_report_run_metric_rejects_duplicates() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new("run-1").build());
    let metric = RunMetric {
        run_id: String::new(),
        node_id: "node-1".to_string(),
        name: "accuracy".to_string(),
        number_value: 0.9,
        format: "RAW".to_string(),
    };

    h.manager.report_run_metric("run-1", &metric).await.unwrap();
    let err = h
        .manager
        .report_run_metric("run-1", &metric)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(h.store.metrics().len(), 1);
    assert_eq!(h.store.metrics()[0].run_id, "run-1");
}

#[tokio::test]
async fn test_get_missing_run_is_not_found() {
    let h = Harness::new();
    let err = h.manager.get_run("nope").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}
