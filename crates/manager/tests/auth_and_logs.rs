mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::Harness;
use pipeline_core::{ErrorKind, PipelineError};
use pipeline_domain::ports::{RequestContext, ResourceAttributes};
use pipeline_manager::HeaderAuthenticator;
use pipeline_testing_utils::{ReportedWorkflowBuilder, RunBuilder, StaticAuthenticator};

fn attributes() -> ResourceAttributes {
    ResourceAttributes {
        namespace: "team-a".to_string(),
        verb: "get".to_string(),
        group: "pipelines.kubeflow.org".to_string(),
        version: "v1beta1".to_string(),
        resource: "runs".to_string(),
        name: "run-1".to_string(),
        ..ResourceAttributes::default()
    }
}

fn request_with(header: &str, value: &str) -> RequestContext {
    RequestContext {
        headers: HashMap::from([(header.to_string(), value.to_string())]),
    }
}

#[tokio::test]
async fn test_first_succeeding_provider_wins() {
    let h = Harness::with_authenticators(vec![
        Arc::new(StaticAuthenticator::failing("no token")),
        Arc::new(HeaderAuthenticator::new("kubeflow-userid", "")),
        Arc::new(StaticAuthenticator::succeeding("fallback")),
    ]);

    let identity = h
        .manager
        .authenticate_request(&request_with("kubeflow-userid", "carol"))
        .await
        .unwrap();
    assert_eq!(identity, "carol");
}

#[tokio::test]
async fn test_all_providers_failing_returns_every_error() {
    let h = Harness::with_authenticators(vec![
        Arc::new(StaticAuthenticator::failing("no token")),
        Arc::new(HeaderAuthenticator::new("kubeflow-userid", "accounts:")),
    ]);

    let err = h
        .manager
        .authenticate_request(&RequestContext::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Aggregate);
    match err {
        PipelineError::Aggregate(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(errors
                .iter()
                .all(|e| e.kind() == ErrorKind::Unauthenticated));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_authorized_request_checks_identity_and_attributes() {
    let h = Harness::new();

    h.manager
        .is_request_authorized(&RequestContext::default(), &attributes())
        .await
        .unwrap();

    let checks = h.authorizer.checks();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].0, "alice");
    assert_eq!(checks[0].1, attributes());
}

#[tokio::test]
async fn test_denied_request_is_permission_denied_with_reason() {
    let h = Harness::new();
    h.authorizer.deny("alice", "no RBAC policy matched");

    let err = h
        .manager
        .is_request_authorized(&RequestContext::default(), &attributes())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(err.to_string().contains("no RBAC policy matched"));
}

#[tokio::test]
async fn test_unauthenticated_request_never_reaches_authorizer() {
    let h = Harness::with_authenticators(vec![Arc::new(StaticAuthenticator::failing("nope"))]);

    let err = h
        .manager
        .is_request_authorized(&RequestContext::default(), &attributes())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Aggregate);
    assert!(h.authorizer.checks().is_empty());
}

fn seed_finished_run(h: &Harness) -> String {
    let object = ReportedWorkflowBuilder::new("run-1").succeeded().build_value();
    let name = object["metadata"]["name"].as_str().unwrap().to_string();
    h.store.insert_run(
        RunBuilder::new("run-1")
            .with_condition("Succeeded")
            .with_runtime_manifest(&object.to_string())
            .build(),
    );
    name
}

#[tokio::test]
async fn test_read_log_prefers_live_pod() {
    let h = Harness::new();
    let name = seed_finished_run(&h);
    h.pods.with_log("pod-1", "live output\n");
    h.objects
        .insert(&format!("logs/{name}/pod-1/main.log"), b"archived output\n");

    let log = h.manager.read_log("run-1", "pod-1", false).await.unwrap();
    assert_eq!(log, b"live output\n");
}

#[tokio::test]
async fn test_read_log_falls_back_to_archive() {
    let h = Harness::new();
    let name = seed_finished_run(&h);
    h.objects
        .insert(&format!("logs/{name}/pod-1/main.log"), b"archived output\n");

    let log = h.manager.read_log("run-1", "pod-1", false).await.unwrap();
    assert_eq!(log, b"archived output\n");
}

#[tokio::test]
async fn test_read_log_missing_archive_is_internal() {
    let h = Harness::new();
    seed_finished_run(&h);

    let err = h.manager.read_log("run-1", "pod-1", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_read_log_requires_existing_run() {
    let h = Harness::new();

    let err = h.manager.read_log("missing", "pod-1", false).await.unwrap_err();
    assert!(matches!(err, PipelineError::BadRequest(_)));
}

#[tokio::test]
async fn test_archive_fallback_without_runtime_manifest_is_bad_request() {
    let h = Harness::new();
    h.store.insert_run(RunBuilder::new("run-1").build());

    let err = h.manager.read_log("run-1", "pod-1", false).await.unwrap_err();
    assert!(matches!(err, PipelineError::BadRequest(_)));
}
