//! Well-known labels, annotations and names shared with the cluster
//! controllers and the execution pods.

/// Correlates an execution object with its run row.
pub const LABEL_RUN_ID: &str = "pipeline/runid";
/// Set once the terminal status of an execution object is in the database.
pub const LABEL_PERSISTED_FINAL_STATE: &str = "pipeline/persistedFinalState";
/// Set by the scheduled-workflow controller on every spawned execution object.
pub const LABEL_SCHEDULED_AT: &str = "scheduledworkflows.kubeflow.org/workflowEpoch";
pub const LABEL_CACHE_ENABLED: &str = "pipelines.kubeflow.org/cache_enabled";
pub const CACHE_DISABLED: &str = "false";
pub const LABEL_PIPELINE_TASK: &str = "tekton.dev/pipelineTask";
pub const LABEL_PIPELINE_RUN: &str = "tekton.dev/pipelineRun";

pub const ANNOTATION_RUN_NAME: &str = "pipelines.kubeflow.org/run_name";
pub const ANNOTATION_ISTIO_SIDECAR_INJECT: &str = "sidecar.istio.io/inject";
pub const ANNOTATION_ISTIO_SIDECAR_INJECT_DISABLED: &str = "false";
pub const ANNOTATION_RESOURCE_TEMPLATES: &str = "tekton.dev/resource_templates";
pub const ANNOTATION_ARTIFACT_ITEMS: &str = "tekton.dev/artifact_items";
pub const ANNOTATION_ARTIFACT_BUCKET: &str = "tekton.dev/artifact_bucket";
pub const ANNOTATION_ARTIFACT_ENDPOINT: &str = "tekton.dev/artifact_endpoint";
pub const ANNOTATION_ARTIFACT_ENDPOINT_SCHEME: &str = "tekton.dev/artifact_endpoint_scheme";

/// Service account templates carry when they were compiled without one.
pub const DEFAULT_SERVICE_ACCOUNT_PLACEHOLDER: &str = "pipeline-runner";

pub const ARTIFACT_SECRET_NAME: &str = "mlpipeline-minio-artifact";
pub const ARTIFACT_SECRET_ACCESS_KEY: &str = "accesskey";
pub const ARTIFACT_SECRET_SECRET_KEY: &str = "secretkey";
pub const DEFAULT_COPY_STEP_NAME: &str = "copy-artifacts";

/// Macro placeholders expanded per run after caller parameters are applied.
pub const MACRO_RUN_UUID: &str = "[[RunUUID]]";
pub const MACRO_CURRENT_TIME: &str = "[[CurrentTime]]";
pub const MACRO_SCHEDULED_TIME: &str = "[[ScheduledTime]]";

/// Self-reference placeholders rewritten to the run id.
pub const UID_PLACEHOLDERS: [&str; 2] = ["$(context.pipelineRun.uid)", "{{workflow.uid}}"];

/// Condition written to a run row while termination is in progress.
pub const RUN_CONDITION_TERMINATING: &str = "Terminating";
/// Spec status the execution controller treats as a cancel request.
pub const WORKFLOW_CANCEL_STATUS: &str = "PipelineRunCancelled";

pub const DEFAULT_EXPERIMENT_NAME: &str = "Default";
pub const DEFAULT_EXPERIMENT_DESCRIPTION: &str =
    "All runs created without specifying an experiment will be grouped here.";

pub const WORKFLOW_GROUP: &str = "tekton.dev";
pub const WORKFLOW_VERSION: &str = "v1beta1";
pub const WORKFLOW_PLURAL: &str = "pipelineruns";
pub const WORKFLOW_KIND: &str = "PipelineRun";
pub const SCHEDULED_WORKFLOW_GROUP: &str = "kubeflow.org";
pub const SCHEDULED_WORKFLOW_VERSION: &str = "v1beta1";
pub const SCHEDULED_WORKFLOW_PLURAL: &str = "scheduledworkflows";
pub const SCHEDULED_WORKFLOW_KIND: &str = "ScheduledWorkflow";
