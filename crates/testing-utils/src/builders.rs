//! Test data builders with sensible defaults.

use pipeline_domain::entities::{
    Experiment, Job, JobStatus, PeriodicSchedule, PipelineSpecRecord, Relationship,
    ResourceReference, ResourceType, Run, StorageState, Trigger,
};
use serde_json::{json, Value};

pub const TEST_NAMESPACE: &str = "kubeflow";

/// Execution template declaring the parameters `x` and `y`, with one
/// embedded task.
pub fn workflow_template() -> Value {
    json!({
        "apiVersion": "tekton.dev/v1beta1",
        "kind": "PipelineRun",
        "metadata": {"generateName": "hello-world-"},
        "spec": {
            "params": [{"name": "x", "value": "0"}],
            "pipelineSpec": {
                "params": [{"name": "x"}, {"name": "y"}],
                "tasks": [{
                    "name": "echo",
                    "taskSpec": {"steps": [{"name": "main", "image": "alpine", "script": "echo $(params.x)"}]}
                }]
            }
        }
    })
}

pub fn workflow_template_manifest() -> String {
    workflow_template().to_string()
}

/// A reported execution object as the controller sends it back.
pub struct ReportedWorkflowBuilder {
    object: Value,
}

impl ReportedWorkflowBuilder {
    pub fn new(run_id: &str) -> Self {
        Self {
            object: json!({
                "apiVersion": "tekton.dev/v1beta1",
                "kind": "PipelineRun",
                "metadata": {
                    "name": format!("hello-world-{}", &run_id[..5.min(run_id.len())]),
                    "namespace": TEST_NAMESPACE,
                    "uid": format!("uid-{run_id}"),
                    "creationTimestamp": "2024-03-01T12:00:00Z",
                    "labels": {"pipeline/runid": run_id}
                },
                "spec": {"params": [{"name": "x", "value": "1"}]},
                "status": {"conditions": [{"type": "Succeeded", "status": "Unknown", "reason": "Running"}]}
            }),
        }
    }

    pub fn succeeded(mut self) -> Self {
        self.object["status"] = json!({
            "conditions": [{"type": "Succeeded", "status": "True", "reason": "Succeeded"}],
            "startTime": "2024-03-01T12:00:00Z",
            "completionTime": "2024-03-01T12:05:00Z"
        });
        self
    }

    pub fn failed(mut self, failed_pod: &str) -> Self {
        self.object["status"] = json!({
            "conditions": [{"type": "Succeeded", "status": "False", "reason": "Failed"}],
            "startTime": "2024-03-01T12:00:00Z",
            "completionTime": "2024-03-01T12:05:00Z",
            "taskRuns": {
                "hello-world-echo": {
                    "pipelineTaskName": "echo",
                    "status": {
                        "podName": failed_pod,
                        "conditions": [{"type": "Succeeded", "status": "False", "reason": "Failed"}]
                    }
                },
                "hello-world-prep": {
                    "pipelineTaskName": "prep",
                    "status": {
                        "podName": "hello-world-prep-pod",
                        "conditions": [{"type": "Succeeded", "status": "True"}]
                    }
                }
            }
        });
        self
    }

    pub fn persisted(mut self) -> Self {
        self.object["metadata"]["labels"]["pipeline/persistedFinalState"] = json!("true");
        self
    }

    pub fn owned_by_job(mut self, job_uid: &str) -> Self {
        self.object["metadata"]["ownerReferences"] = json!([{
            "apiVersion": "kubeflow.org/v1beta1",
            "kind": "ScheduledWorkflow",
            "name": "nightly",
            "uid": job_uid
        }]);
        self.object["metadata"]["labels"]["scheduledworkflows.kubeflow.org/workflowEpoch"] =
            json!("1709294400");
        self
    }

    pub fn without_label(mut self) -> Self {
        self.object["metadata"]["labels"] = json!({});
        self
    }

    pub fn without_namespace(mut self) -> Self {
        self.object["metadata"]
            .as_object_mut()
            .map(|m| m.remove("namespace"));
        self
    }

    pub fn build_value(self) -> Value {
        self.object
    }

    pub fn build(self) -> pipeline_domain::Workflow {
        serde_json::from_value(self.object).unwrap()
    }
}

pub struct ExperimentBuilder {
    experiment: Experiment,
}

impl ExperimentBuilder {
    pub fn new() -> Self {
        Self {
            experiment: Experiment {
                id: "exp-1".to_string(),
                name: "experiment".to_string(),
                description: String::new(),
                namespace: String::new(),
                created_at: 1_709_294_400,
                storage_state: StorageState::Available,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.experiment.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.experiment.name = name.to_string();
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.experiment.namespace = namespace.to_string();
        self
    }

    pub fn build(self) -> Experiment {
        self.experiment
    }
}

impl Default for ExperimentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn reference(
    resource_id: &str,
    resource_type: ResourceType,
    reference_id: &str,
    reference_type: ResourceType,
    relationship: Relationship,
) -> ResourceReference {
    ResourceReference {
        resource_id: resource_id.to_string(),
        resource_type,
        reference_id: reference_id.to_string(),
        reference_name: String::new(),
        reference_type,
        relationship,
    }
}

pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job {
                id: id.to_string(),
                display_name: format!("job {id}"),
                name: format!("job-{id}"),
                namespace: TEST_NAMESPACE.to_string(),
                service_account: "pipeline-runner".to_string(),
                description: String::new(),
                max_concurrency: 1,
                no_catchup: false,
                enabled: true,
                trigger: Trigger {
                    cron_schedule: None,
                    periodic_schedule: Some(PeriodicSchedule {
                        start_time: None,
                        end_time: None,
                        interval_seconds: 3600,
                    }),
                },
                conditions: "Enabled".to_string(),
                status: JobStatus::Ready,
                pipeline_spec: PipelineSpecRecord::default(),
                resource_references: Vec::new(),
                created_at: 1_709_294_400,
                updated_at: 1_709_294_400,
            },
        }
    }

    pub fn in_experiment(mut self, experiment_id: &str) -> Self {
        let job_id = self.job.id.clone();
        self.job.resource_references.retain(|r| r.reference_type != ResourceType::Experiment);
        self.job.resource_references.push(reference(
            &job_id,
            ResourceType::Job,
            experiment_id,
            ResourceType::Experiment,
            Relationship::Owner,
        ));
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.job.created_at = created_at;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enabled = false;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

pub struct RunBuilder {
    run: Run,
}

impl RunBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            run: Run {
                id: id.to_string(),
                experiment_id: "exp-1".to_string(),
                display_name: format!("run {id}"),
                name: format!("hello-world-{}", &id[..5.min(id.len())]),
                storage_state: StorageState::Available,
                namespace: TEST_NAMESPACE.to_string(),
                service_account: "pipeline-runner".to_string(),
                description: String::new(),
                created_at: 1_709_294_400,
                scheduled_at: 1_709_294_400,
                finished_at: 0,
                conditions: "Running".to_string(),
                pipeline_spec: PipelineSpecRecord::default(),
                workflow_runtime_manifest: String::new(),
                resource_references: vec![reference(
                    id,
                    ResourceType::Run,
                    "exp-1",
                    ResourceType::Experiment,
                    Relationship::Owner,
                )],
            },
        }
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.run.conditions = condition.to_string();
        self
    }

    pub fn with_finished_at(mut self, finished_at: i64) -> Self {
        self.run.finished_at = finished_at;
        self
    }

    pub fn with_runtime_manifest(mut self, manifest: &str) -> Self {
        self.run.workflow_runtime_manifest = manifest.to_string();
        self
    }

    pub fn build(self) -> Run {
        self.run
    }
}
