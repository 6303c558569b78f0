mod common;

use common::Harness;
use pipeline_core::ErrorKind;
use pipeline_domain::{
    JobRequest, JobStatus, Parameter, PeriodicSchedule, PipelineSpec, Relationship, ResourceRef,
    ResourceType, ScheduledWorkflow, Trigger,
};
use pipeline_testing_utils::{
    workflow_template_manifest, ClusterOp, ExperimentBuilder, JobBuilder, ReportedWorkflowBuilder,
    TEST_NAMESPACE,
};
use serde_json::json;

fn job_request() -> JobRequest {
    JobRequest {
        name: "Nightly Train".to_string(),
        description: "retrains every hour".to_string(),
        pipeline_spec: PipelineSpec {
            workflow_manifest: workflow_template_manifest(),
            parameters: vec![Parameter {
                name: "x".to_string(),
                value: "7".to_string(),
            }],
            ..PipelineSpec::default()
        },
        resource_references: vec![ResourceRef::new(
            ResourceType::Experiment,
            "exp-1",
            Relationship::Owner,
        )],
        service_account: String::new(),
        max_concurrency: 2,
        trigger: Trigger {
            cron_schedule: None,
            periodic_schedule: Some(PeriodicSchedule {
                start_time: None,
                end_time: None,
                interval_seconds: 3600,
            }),
        },
        enabled: true,
        no_catchup: true,
    }
}

/// Seeds the recurring definition backing a job row built by `JobBuilder`.
fn seed_definition(h: &Harness, job_id: &str, uid: &str) {
    h.scheduled_workflows.seed(
        TEST_NAMESPACE,
        json!({
            "apiVersion": "kubeflow.org/v1beta1",
            "kind": "ScheduledWorkflow",
            "metadata": {"name": format!("job-{job_id}"), "namespace": TEST_NAMESPACE, "uid": uid, "resourceVersion": "1"},
            "spec": {"enabled": true, "maxConcurrency": 1}
        }),
    );
}

#[tokio::test]
async fn test_create_job_submits_definition_and_stores_row() {
    let h = Harness::new().with_experiment();

    let job = h.manager.create_job(&job_request()).await.unwrap();

    assert_eq!(job.id, "job-uid-1");
    assert!(job.name.starts_with("nightly-train"));
    assert_eq!(job.display_name, "Nightly Train");
    assert_eq!(job.namespace, TEST_NAMESPACE);
    assert_eq!(job.status, JobStatus::Ready);
    assert!(job.enabled);
    assert_eq!(job.max_concurrency, 2);
    assert!(job.resource_references.iter().all(|r| r.resource_id == job.id));
    assert_eq!(h.store.job(&job.id).unwrap().display_name, "Nightly Train");

    let definition = h
        .scheduled_workflows
        .object(TEST_NAMESPACE, &job.name)
        .unwrap();
    assert_eq!(definition["spec"]["enabled"], json!(true));
    assert_eq!(definition["spec"]["maxConcurrency"], json!(2));
    assert_eq!(definition["spec"]["noCatchup"], json!(true));
    assert_eq!(
        definition["spec"]["trigger"]["periodicSchedule"]["intervalSecond"],
        json!(3600)
    );
    assert_eq!(
        definition["spec"]["workflow"]["parameters"],
        json!([{"name": "x", "value": "7"}])
    );
    assert_eq!(
        definition["spec"]["workflow"]["spec"]["serviceAccountName"],
        json!("pipeline-runner")
    );
    assert!(h.workflows.calls().is_empty());
}

#[tokio::test]
async fn test_create_job_with_invalid_trigger_submits_nothing() {
    let h = Harness::new().with_experiment();
    let mut request = job_request();
    request.trigger.periodic_schedule = None;

    let err = h.manager.create_job(&request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.scheduled_workflows.object_count(), 0);
}

#[tokio::test]
async fn test_create_job_definition_failure_writes_no_row() {
    let h = Harness::new().with_experiment();
    h.scheduled_workflows.fail(ClusterOp::Create, None, 500, None);

    let err = h.manager.create_job(&job_request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(h.store.job("job-uid-1").is_none());
}

#[tokio::test]
async fn test_disable_job_merge_patches_enabled_only() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").build());
    seed_definition(&h, "job-1", "job-1");

    h.manager.enable_job("job-1", false).await.unwrap();

    let patches = h.scheduled_workflows.calls_of(ClusterOp::Patch);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].body, Some(json!({"spec": {"enabled": false}})));
    let definition = h.scheduled_workflows.object(TEST_NAMESPACE, "job-job-1").unwrap();
    assert_eq!(definition["spec"]["maxConcurrency"], json!(1));
    assert!(!h.store.job("job-1").unwrap().enabled);
}

#[tokio::test]
async fn test_enable_job_rejects_recreated_definition() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").disabled().build());
    seed_definition(&h, "job-1", "some-other-uid");

    let err = h.manager.enable_job("job-1", true).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(h.scheduled_workflows.calls_of(ClusterOp::Patch).is_empty());
    assert!(!h.store.job("job-1").unwrap().enabled);
}

#[tokio::test]
async fn test_enable_job_flips_definition_then_row() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").disabled().build());
    seed_definition(&h, "job-1", "job-1");

    h.manager.enable_job("job-1", true).await.unwrap();

    assert!(h.store.job("job-1").unwrap().enabled);
    let definition = h.scheduled_workflows.object(TEST_NAMESPACE, "job-job-1").unwrap();
    assert_eq!(definition["spec"]["enabled"], json!(true));
}

#[tokio::test]
async fn test_delete_job_tolerates_missing_definition() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").build());

    h.manager.delete_job("job-1").await.unwrap();

    assert!(h.store.job("job-1").is_none());
    assert_eq!(h.scheduled_workflows.calls_of(ClusterOp::Delete).len(), 1);
}

#[tokio::test]
async fn test_delete_job_keeps_hidden_row_when_row_delete_fails() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").build());
    seed_definition(&h, "job-1", "job-1");
    h.store.fail_on("job.delete");

    h.manager.delete_job("job-1").await.unwrap();

    assert_eq!(h.store.job("job-1").unwrap().status, JobStatus::Deleting);
    assert!(h.manager.get_job("job-1").await.unwrap_err().is_not_found());
    assert_eq!(h.scheduled_workflows.object_count(), 0);
}

#[tokio::test]
async fn test_delete_job_restores_row_when_definition_delete_fails() {
    let h = Harness::new();
    h.store.insert_experiment(ExperimentBuilder::new().build());
    h.store
        .insert_job(JobBuilder::new("job-1").in_experiment("exp-1").build());
    seed_definition(&h, "job-1", "job-1");
    h.scheduled_workflows.fail(ClusterOp::Delete, None, 500, Some(1));

    let err = h.manager.delete_job("job-1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.store.job("job-1").unwrap().status, JobStatus::Ready);
    assert_eq!(h.scheduled_workflows.object_count(), 1);
    h.manager.get_job("job-1").await.unwrap();

    // The definition still fires, so its runs must keep landing.
    let report = ReportedWorkflowBuilder::new("run-1")
        .owned_by_job("job-1")
        .build();
    h.manager.report_workflow(&report).await.unwrap();
    assert!(h.store.run("run-1").is_some());

    h.manager.delete_job("job-1").await.unwrap();

    assert!(h.store.job("job-1").is_none());
    assert_eq!(h.scheduled_workflows.object_count(), 0);
    assert_eq!(h.scheduled_workflows.calls_of(ClusterOp::Delete).len(), 2);
}

#[tokio::test]
async fn test_report_scheduled_workflow_folds_status_into_row() {
    let h = Harness::new();
    h.store.insert_job(JobBuilder::new("job-1").build());
    let report: ScheduledWorkflow = serde_json::from_value(json!({
        "metadata": {"name": "job-job-1", "namespace": TEST_NAMESPACE, "uid": "job-1"},
        "spec": {
            "enabled": false,
            "maxConcurrency": 5,
            "trigger": {"cronSchedule": {"cron": "0 0 * * * *"}}
        },
        "status": {"conditions": [{"type": "Disabled", "status": "True"}]}
    }))
    .unwrap();

    h.manager.report_scheduled_workflow(&report).await.unwrap();

    let job = h.store.job("job-1").unwrap();
    assert!(!job.enabled);
    assert_eq!(job.conditions, "Disabled");
    assert_eq!(job.max_concurrency, 5);
    assert_eq!(job.trigger.cron_schedule.unwrap().cron, "0 0 * * * *");
    assert!(job.trigger.periodic_schedule.is_none());
}

#[tokio::test]
async fn test_report_scheduled_workflow_requires_uid() {
    let h = Harness::new();
    let report = ScheduledWorkflow::default();

    let err = h.manager.report_scheduled_workflow(&report).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
