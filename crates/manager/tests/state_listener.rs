mod common;

use common::Harness;
use pipeline_core::constants::LABEL_PERSISTED_FINAL_STATE;
use pipeline_core::ErrorKind;
use pipeline_domain::{Relationship, ResourceType};
use pipeline_testing_utils::{
    ClusterOp, ExperimentBuilder, JobBuilder, ReportedWorkflowBuilder, RunBuilder, TEST_NAMESPACE,
};
use serde_json::json;

const RUN_ID: &str = "run-12345";
const OBJECT_NAME: &str = "hello-world-run-1";
const FINISHED_AT: i64 = 1_709_294_700;

#[tokio::test]
async fn test_running_report_updates_row_without_marking() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new(RUN_ID).build());
    let report = ReportedWorkflowBuilder::new(RUN_ID).build();

    h.manager.report_workflow(&report).await.unwrap();

    let run = h.store.run(RUN_ID).unwrap();
    assert_eq!(run.conditions, "Running");
    assert!(run.workflow_runtime_manifest.contains(OBJECT_NAME));
    assert!(h.workflows.calls_of(ClusterOp::Patch).is_empty());
}

#[tokio::test]
async fn test_terminal_report_is_recorded_once_and_marked() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new(RUN_ID).build());
    let value = ReportedWorkflowBuilder::new(RUN_ID).succeeded().build_value();
    h.workflows.seed(TEST_NAMESPACE, value.clone());
    let report: pipeline_domain::Workflow = serde_json::from_value(value).unwrap();
    let writes_before = h.store.run_writes();

    h.manager.report_workflow(&report).await.unwrap();
    h.manager.report_workflow(&report).await.unwrap();

    assert_eq!(h.store.run_writes(), writes_before + 1);
    let run = h.store.run(RUN_ID).unwrap();
    assert_eq!(run.conditions, "Succeeded");
    assert_eq!(run.finished_at, FINISHED_AT);

    let object = h.workflows.object(TEST_NAMESPACE, OBJECT_NAME).unwrap();
    assert_eq!(
        object["metadata"]["labels"][LABEL_PERSISTED_FINAL_STATE],
        json!("true")
    );
    let patch = &h.workflows.calls_of(ClusterOp::Patch)[0];
    assert_eq!(
        patch.body,
        Some(json!({"metadata": {"labels": {LABEL_PERSISTED_FINAL_STATE: "true"}}}))
    );
}

#[tokio::test]
async fn test_marker_patch_retries_conflicts() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new(RUN_ID).build());
    let value = ReportedWorkflowBuilder::new(RUN_ID).failed("pod-1").build_value();
    h.workflows.seed(TEST_NAMESPACE, value.clone());
    h.workflows.fail(ClusterOp::Patch, None, 409, Some(2));

    h.manager
        .report_workflow(&serde_json::from_value(value).unwrap())
        .await
        .unwrap();

    assert_eq!(h.workflows.calls_of(ClusterOp::Patch).len(), 3);
    assert_eq!(h.store.run(RUN_ID).unwrap().conditions, "Failed");
}

#[tokio::test]
async fn test_marker_patch_on_vanished_object_signals_not_found() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new(RUN_ID).build());
    let report = ReportedWorkflowBuilder::new(RUN_ID).succeeded().build();

    let err = h.manager.report_workflow(&report).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.store.run(RUN_ID).unwrap().conditions, "Succeeded");
}

#[tokio::test]
async fn test_persisted_object_is_collected_once() {
    let h = Harness::new();
    h.store.insert_run(
        RunBuilder::new(RUN_ID)
            .with_condition("Succeeded")
            .with_finished_at(FINISHED_AT)
            .build(),
    );
    let value = ReportedWorkflowBuilder::new(RUN_ID)
        .succeeded()
        .persisted()
        .build_value();
    h.workflows.seed(TEST_NAMESPACE, value.clone());
    let report: pipeline_domain::Workflow = serde_json::from_value(value).unwrap();
    let writes_before = h.store.run_writes();

    h.manager.report_workflow(&report).await.unwrap();
    let second = h.manager.report_workflow(&report).await.unwrap_err();

    assert!(second.is_not_found());
    assert_eq!(h.workflows.calls_of(ClusterOp::Delete).len(), 2);
    assert_eq!(h.gc.count(), 1);
    assert_eq!(h.store.run_writes(), writes_before);
    assert_eq!(h.workflows.object_count(), 0);
}

#[tokio::test]
async fn test_report_requires_run_label_and_namespace() {
    let h = Harness::new();

    let no_label = ReportedWorkflowBuilder::new(RUN_ID).without_label().build();
    let err = h.manager.report_workflow(&no_label).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let no_namespace = ReportedWorkflowBuilder::new(RUN_ID)
        .without_namespace()
        .build();
    let err = h.manager.report_workflow(&no_namespace).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(h.store.run_writes(), 0);
}

#[tokio::test]
async fn test_job_spawned_report_creates_row_with_job_and_experiment_edges() {
    let h = Harness::new();
    h.store.insert_experiment(ExperimentBuilder::new().build());
    h.store.insert_job(
        JobBuilder::new("job-1")
            .with_name("nightly")
            .in_experiment("exp-1")
            .build(),
    );
    let report = ReportedWorkflowBuilder::new(RUN_ID)
        .owned_by_job("job-1")
        .build();

    h.manager.report_workflow(&report).await.unwrap();

    let run = h.store.run(RUN_ID).unwrap();
    assert_eq!(run.name, OBJECT_NAME);
    assert_eq!(run.display_name, OBJECT_NAME);
    assert_eq!(run.namespace, TEST_NAMESPACE);
    assert_eq!(run.experiment_id, "exp-1");
    assert_eq!(run.scheduled_at, 1_709_294_400);
    assert_eq!(run.created_at, 1_709_294_400);
    assert_eq!(run.conditions, "Running");

    let creator = run
        .resource_references
        .iter()
        .find(|r| r.relationship == Relationship::Creator)
        .unwrap();
    assert_eq!(creator.reference_type, ResourceType::Job);
    assert_eq!(creator.reference_id, "job-1");
    assert_eq!(creator.reference_name, "nightly");
    let owner = run
        .resource_references
        .iter()
        .find(|r| r.relationship == Relationship::Owner)
        .unwrap();
    assert_eq!(owner.reference_type, ResourceType::Experiment);
    assert_eq!(owner.reference_id, "exp-1");
}

#[tokio::test]
async fn test_job_spawned_report_without_experiment_edge_fails() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").build());
    let report = ReportedWorkflowBuilder::new(RUN_ID)
        .owned_by_job("job-1")
        .build();

    let err = h.manager.report_workflow(&report).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.store.run(RUN_ID).is_none());
}
