mod common;

use common::{test_options, Harness};
use pipeline_core::{ErrorKind, ManagerOptions};
use pipeline_domain::StorageState;
use pipeline_testing_utils::{ClusterOp, ExperimentBuilder, JobBuilder, TEST_NAMESPACE};
use serde_json::json;

/// Five jobs in `exp-1`, created in order, each with a live definition.
fn seed_jobs(h: &Harness) -> Vec<String> {
    h.store.insert_experiment(ExperimentBuilder::new().build());
    (1..=5)
        .map(|n| {
            let id = format!("job-{n}");
            h.store.insert_job(
                JobBuilder::new(&id)
                    .in_experiment("exp-1")
                    .with_created_at(1_709_294_400 + n)
                    .build(),
            );
            h.scheduled_workflows.seed(
                TEST_NAMESPACE,
                json!({
                    "metadata": {"name": format!("job-{id}"), "uid": id, "resourceVersion": "1"},
                    "spec": {"enabled": true}
                }),
            );
            id
        })
        .collect()
}

fn small_pages() -> Harness {
    Harness::with_options(ManagerOptions {
        archive_page_size: 2,
        ..test_options()
    })
}

fn definition_enabled(h: &Harness, job_id: &str) -> bool {
    h.scheduled_workflows
        .object(TEST_NAMESPACE, &format!("job-{job_id}"))
        .unwrap()["spec"]["enabled"]
        .as_bool()
        .unwrap()
}

#[tokio::test]
async fn test_archive_disables_every_job_across_pages() {
    let h = small_pages();
    let jobs = seed_jobs(&h);

    h.manager.archive_experiment("exp-1").await.unwrap();

    for id in &jobs {
        assert!(!definition_enabled(&h, id), "{id} still enabled");
    }
    assert_eq!(
        h.store.experiment("exp-1").unwrap().storage_state,
        StorageState::Archived
    );
}

#[tokio::test]
async fn test_archive_stops_at_first_failed_job() {
    let h = small_pages();
    let jobs = seed_jobs(&h);
    h.scheduled_workflows
        .fail(ClusterOp::Patch, Some("job-job-3"), 500, None);

    let err = h.manager.archive_experiment("exp-1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!definition_enabled(&h, &jobs[0]));
    assert!(!definition_enabled(&h, &jobs[1]));
    assert!(definition_enabled(&h, &jobs[2]));
    assert!(definition_enabled(&h, &jobs[3]));
    assert!(definition_enabled(&h, &jobs[4]));
    let patched: Vec<String> = h
        .scheduled_workflows
        .calls_of(ClusterOp::Patch)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert!(!patched.contains(&"job-job-4".to_string()));
    assert_eq!(
        h.store.experiment("exp-1").unwrap().storage_state,
        StorageState::Available
    );
}

#[tokio::test]
async fn test_archive_experiment_without_jobs() {
    let h = Harness::new().with_experiment();

    h.manager.archive_experiment("exp-1").await.unwrap();

    assert!(h.scheduled_workflows.calls().is_empty());
    assert_eq!(
        h.store.experiment("exp-1").unwrap().storage_state,
        StorageState::Archived
    );
}

#[tokio::test]
async fn test_unarchive_leaves_jobs_disabled() {
    let h = Harness::new();
    let jobs = seed_jobs(&h);
    h.manager.archive_experiment("exp-1").await.unwrap();
    let patches = h.scheduled_workflows.calls_of(ClusterOp::Patch).len();

    h.manager.unarchive_experiment("exp-1").await.unwrap();

    assert_eq!(
        h.store.experiment("exp-1").unwrap().storage_state,
        StorageState::Available
    );
    assert_eq!(h.scheduled_workflows.calls_of(ClusterOp::Patch).len(), patches);
    assert!(!definition_enabled(&h, &jobs[0]));
}

#[tokio::test]
async fn test_archive_missing_experiment_is_not_found() {
    let h = Harness::new();
    let err = h.manager.archive_experiment("nope").await.unwrap_err();
    assert!(err.is_not_found());
}
