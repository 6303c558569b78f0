//! Persistence abstractions for the control-plane entities.
//!
//! Lookups by id return `Ok(None)` when the row is absent; mutations of a
//! missing row return a NotFound error.

use async_trait::async_trait;
use pipeline_core::PipelineResult;

use crate::entities::{
    Experiment, FilterContext, Job, JobStatus, ListOptions, ListPage, Pipeline, PipelineStatus,
    PipelineVersion, ResourceReference, ResourceType, Run, RunMetric,
};

#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    /// Fails AlreadyExists when (name, namespace) is taken.
    async fn create(&self, experiment: &Experiment) -> PipelineResult<Experiment>;
    async fn get(&self, id: &str) -> PipelineResult<Option<Experiment>>;
    async fn get_by_name(&self, name: &str, namespace: &str) -> PipelineResult<Option<Experiment>>;
    /// Filter by `Namespace` reference only.
    async fn list(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Experiment>>;
    async fn delete(&self, id: &str) -> PipelineResult<()>;
    async fn archive(&self, id: &str) -> PipelineResult<()>;
    async fn unarchive(&self, id: &str) -> PipelineResult<()>;
}

/// Singleton pointer to the experiment that collects unassigned runs.
#[async_trait]
pub trait DefaultExperimentRepository: Send + Sync {
    async fn get_default_experiment_id(&self) -> PipelineResult<Option<String>>;
    /// Stores `id` unless a default already exists; returns the stored id.
    async fn set_default_experiment_id_if_absent(&self, id: &str) -> PipelineResult<String>;
}

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Inserts the pipeline and its first version together.
    async fn create_pipeline(
        &self,
        pipeline: &Pipeline,
        version: &PipelineVersion,
    ) -> PipelineResult<Pipeline>;
    async fn get_pipeline(&self, id: &str) -> PipelineResult<Option<Pipeline>>;
    /// Only `Ready` pipelines are listed.
    async fn list_pipelines(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Pipeline>>;
    async fn delete_pipeline(&self, id: &str) -> PipelineResult<()>;
    async fn update_pipeline_status(&self, id: &str, status: PipelineStatus) -> PipelineResult<()>;
    async fn update_pipeline_default_version(
        &self,
        pipeline_id: &str,
        version_id: &str,
    ) -> PipelineResult<()>;

    async fn create_pipeline_version(
        &self,
        version: &PipelineVersion,
        update_default: bool,
    ) -> PipelineResult<PipelineVersion>;
    async fn get_pipeline_version(&self, id: &str) -> PipelineResult<Option<PipelineVersion>>;
    /// Only `Ready` versions are listed.
    async fn list_pipeline_versions(
        &self,
        pipeline_id: &str,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<PipelineVersion>>;
    async fn delete_pipeline_version(&self, id: &str) -> PipelineResult<()>;
    async fn update_pipeline_version_status(
        &self,
        id: &str,
        status: PipelineStatus,
    ) -> PipelineResult<()>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> PipelineResult<Job>;
    async fn get(&self, id: &str) -> PipelineResult<Option<Job>>;
    /// Filter by `Experiment` or `Namespace` reference. Deleting jobs are
    /// hidden.
    async fn list(&self, filter: &FilterContext, opts: &ListOptions)
        -> PipelineResult<ListPage<Job>>;
    async fn enable(&self, id: &str, enabled: bool, updated_at: i64) -> PipelineResult<()>;
    async fn update_status(&self, id: &str, status: JobStatus) -> PipelineResult<()>;
    /// Folds controller-reported state (enabled, conditions, trigger,
    /// concurrency) into the row.
    async fn update_from_report(&self, job: &Job) -> PipelineResult<()>;
    async fn delete(&self, id: &str) -> PipelineResult<()>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: &Run) -> PipelineResult<Run>;
    async fn get(&self, id: &str) -> PipelineResult<Option<Run>>;
    /// Filter by `Experiment`, `Job` or `Namespace` reference.
    async fn list(&self, filter: &FilterContext, opts: &ListOptions)
        -> PipelineResult<ListPage<Run>>;
    /// Updates condition, finish time and runtime manifest of an existing row.
    async fn update(
        &self,
        id: &str,
        condition: &str,
        finished_at: i64,
        runtime_manifest: &str,
    ) -> PipelineResult<()>;
    /// Inserts the row, or updates the status columns when it already exists.
    async fn create_or_update(&self, run: &Run) -> PipelineResult<()>;
    async fn archive(&self, id: &str) -> PipelineResult<()>;
    async fn unarchive(&self, id: &str) -> PipelineResult<()>;
    async fn delete(&self, id: &str) -> PipelineResult<()>;
    /// Flips a non-finished run to the terminating condition.
    async fn terminate(&self, id: &str) -> PipelineResult<()>;
    /// Fails AlreadyExists when the (run, node, name) metric was reported.
    async fn report_metric(&self, metric: &RunMetric) -> PipelineResult<()>;
}

#[async_trait]
pub trait ResourceReferenceRepository: Send + Sync {
    async fn get(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        reference_type: ResourceType,
    ) -> PipelineResult<Option<ResourceReference>>;
}
