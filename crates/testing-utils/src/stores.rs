//! In-memory implementation of every store trait.
//!
//! A single [`InMemoryStore`] backs all repositories so reference lookups
//! see the same rows the other stores write. Failures can be injected per
//! operation name (for example `"run.create"`).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::entities::{
    Experiment, FilterContext, Job, JobStatus, ListOptions, ListPage, Pipeline, PipelineStatus,
    PipelineVersion, ResourceReference, ResourceType, Run, RunMetric, StorageState,
};
use pipeline_domain::repositories::{
    DefaultExperimentRepository, ExperimentRepository, JobRepository, PipelineRepository,
    ResourceReferenceRepository, RunRepository,
};

#[derive(Debug, Default)]
struct State {
    experiments: HashMap<String, Experiment>,
    default_experiment_id: Option<String>,
    pipelines: HashMap<String, Pipeline>,
    versions: HashMap<String, PipelineVersion>,
    jobs: HashMap<String, Job>,
    runs: HashMap<String, Run>,
    metrics: Vec<RunMetric>,
    failing: HashSet<String>,
    run_writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` fail with an internal error.
    pub fn fail_on(&self, operation: &str) {
        self.state.lock().unwrap().failing.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    pub fn insert_experiment(&self, experiment: Experiment) {
        let mut state = self.state.lock().unwrap();
        state.experiments.insert(experiment.id.clone(), experiment);
    }

    pub fn insert_job(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job.id.clone(), job);
    }

    pub fn insert_run(&self, run: Run) {
        let mut state = self.state.lock().unwrap();
        state.runs.insert(run.id.clone(), run);
    }

    pub fn run(&self, id: &str) -> Option<Run> {
        self.state.lock().unwrap().runs.get(id).cloned()
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(id).cloned()
    }

    pub fn experiment(&self, id: &str) -> Option<Experiment> {
        self.state.lock().unwrap().experiments.get(id).cloned()
    }

    pub fn pipeline(&self, id: &str) -> Option<Pipeline> {
        self.state.lock().unwrap().pipelines.get(id).cloned()
    }

    pub fn pipeline_version(&self, id: &str) -> Option<PipelineVersion> {
        self.state.lock().unwrap().versions.get(id).cloned()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().unwrap().runs.len()
    }

    pub fn experiment_count(&self) -> usize {
        self.state.lock().unwrap().experiments.len()
    }

    /// Number of successful run inserts and updates.
    pub fn run_writes(&self) -> usize {
        self.state.lock().unwrap().run_writes
    }

    pub fn metrics(&self) -> Vec<RunMetric> {
        self.state.lock().unwrap().metrics.clone()
    }

    fn lock_checked(&self, operation: &str) -> PipelineResult<std::sync::MutexGuard<'_, State>> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(operation) {
            return Err(PipelineError::Internal(format!("injected failure: {operation}")));
        }
        Ok(state)
    }
}

fn references_key(references: &[ResourceReference], filter: &FilterContext) -> bool {
    match &filter.reference_key {
        None => true,
        Some(key) => references
            .iter()
            .any(|r| r.reference_type == key.resource_type && r.reference_id == key.id),
    }
}

fn sorted<T: Clone>(mut items: Vec<T>, key: impl Fn(&T) -> (i64, String), opts: &ListOptions) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    if opts.descending {
        items.reverse();
    }
    items
}

#[async_trait]
impl ExperimentRepository for InMemoryStore {
    async fn create(&self, experiment: &Experiment) -> PipelineResult<Experiment> {
        let mut state = self.lock_checked("experiment.create")?;
        let taken = state
            .experiments
            .values()
            .any(|e| e.name == experiment.name && e.namespace == experiment.namespace);
        if taken {
            return Err(PipelineError::already_exists("experiment", &experiment.name));
        }
        state
            .experiments
            .insert(experiment.id.clone(), experiment.clone());
        Ok(experiment.clone())
    }

    async fn get(&self, id: &str) -> PipelineResult<Option<Experiment>> {
        let state = self.lock_checked("experiment.get")?;
        Ok(state.experiments.get(id).cloned())
    }

    async fn get_by_name(&self, name: &str, namespace: &str) -> PipelineResult<Option<Experiment>> {
        let state = self.lock_checked("experiment.get_by_name")?;
        Ok(state
            .experiments
            .values()
            .find(|e| e.name == name && e.namespace == namespace)
            .cloned())
    }

    async fn list(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Experiment>> {
        let state = self.lock_checked("experiment.list")?;
        let items: Vec<Experiment> = state
            .experiments
            .values()
            .filter(|e| match &filter.reference_key {
                Some(key) if key.resource_type == ResourceType::Namespace => e.namespace == key.id,
                _ => true,
            })
            .cloned()
            .collect();
        let items = sorted(items, |e| (e.created_at, e.id.clone()), opts);
        opts.paginate(&items)
    }

    async fn delete(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("experiment.delete")?;
        state
            .experiments
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PipelineError::not_found("experiment", id))
    }

    async fn archive(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("experiment.archive")?;
        let experiment = state
            .experiments
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("experiment", id))?;
        experiment.storage_state = StorageState::Archived;
        for run in state.runs.values_mut().filter(|r| r.experiment_id == id) {
            run.storage_state = StorageState::Archived;
        }
        for job in state
            .jobs
            .values_mut()
            .filter(|j| j.experiment_id() == Some(id))
        {
            job.enabled = false;
        }
        Ok(())
    }

    async fn unarchive(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("experiment.unarchive")?;
        let experiment = state
            .experiments
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("experiment", id))?;
        experiment.storage_state = StorageState::Available;
        Ok(())
    }
}

#[async_trait]
impl DefaultExperimentRepository for InMemoryStore {
    async fn get_default_experiment_id(&self) -> PipelineResult<Option<String>> {
        let state = self.lock_checked("default_experiment.get")?;
        Ok(state.default_experiment_id.clone())
    }

    async fn set_default_experiment_id_if_absent(&self, id: &str) -> PipelineResult<String> {
        let mut state = self.lock_checked("default_experiment.set")?;
        Ok(state
            .default_experiment_id
            .get_or_insert_with(|| id.to_string())
            .clone())
    }
}

#[async_trait]
impl PipelineRepository for InMemoryStore {
    async fn create_pipeline(
        &self,
        pipeline: &Pipeline,
        version: &PipelineVersion,
    ) -> PipelineResult<Pipeline> {
        let mut state = self.lock_checked("pipeline.create")?;
        let taken = state
            .pipelines
            .values()
            .any(|p| p.name == pipeline.name && p.namespace == pipeline.namespace);
        if taken {
            return Err(PipelineError::already_exists("pipeline", &pipeline.name));
        }
        state.pipelines.insert(pipeline.id.clone(), pipeline.clone());
        state.versions.insert(version.id.clone(), version.clone());
        Ok(pipeline.clone())
    }

    async fn get_pipeline(&self, id: &str) -> PipelineResult<Option<Pipeline>> {
        let state = self.lock_checked("pipeline.get")?;
        Ok(state
            .pipelines
            .get(id)
            .filter(|p| p.status == PipelineStatus::Ready)
            .cloned())
    }

    async fn list_pipelines(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Pipeline>> {
        let state = self.lock_checked("pipeline.list")?;
        let items: Vec<Pipeline> = state
            .pipelines
            .values()
            .filter(|p| p.status == PipelineStatus::Ready)
            .filter(|p| match &filter.reference_key {
                Some(key) if key.resource_type == ResourceType::Namespace => p.namespace == key.id,
                _ => true,
            })
            .cloned()
            .collect();
        let items = sorted(items, |p| (p.created_at, p.id.clone()), opts);
        opts.paginate(&items)
    }

    async fn delete_pipeline(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("pipeline.delete")?;
        state.pipelines.remove(id);
        state.versions.retain(|_, v| v.pipeline_id != id);
        Ok(())
    }

    async fn update_pipeline_status(&self, id: &str, status: PipelineStatus) -> PipelineResult<()> {
        let mut state = self.lock_checked("pipeline.update_status")?;
        let pipeline = state
            .pipelines
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("pipeline", id))?;
        pipeline.status = status;
        Ok(())
    }

    async fn update_pipeline_default_version(
        &self,
        pipeline_id: &str,
        version_id: &str,
    ) -> PipelineResult<()> {
        let mut state = self.lock_checked("pipeline.update_default_version")?;
        let pipeline = state
            .pipelines
            .get_mut(pipeline_id)
            .ok_or_else(|| PipelineError::not_found("pipeline", pipeline_id))?;
        pipeline.default_version_id = Some(version_id.to_string());
        Ok(())
    }

    async fn create_pipeline_version(
        &self,
        version: &PipelineVersion,
        update_default: bool,
    ) -> PipelineResult<PipelineVersion> {
        let mut state = self.lock_checked("pipeline_version.create")?;
        let taken = state
            .versions
            .values()
            .any(|v| v.pipeline_id == version.pipeline_id && v.name == version.name);
        if taken {
            return Err(PipelineError::already_exists("pipeline version", &version.name));
        }
        let pipeline = state
            .pipelines
            .get_mut(&version.pipeline_id)
            .ok_or_else(|| PipelineError::not_found("pipeline", &version.pipeline_id))?;
        if update_default {
            pipeline.default_version_id = Some(version.id.clone());
        }
        state.versions.insert(version.id.clone(), version.clone());
        Ok(version.clone())
    }

    async fn get_pipeline_version(&self, id: &str) -> PipelineResult<Option<PipelineVersion>> {
        let state = self.lock_checked("pipeline_version.get")?;
        Ok(state
            .versions
            .get(id)
            .filter(|v| v.status == PipelineStatus::Ready)
            .cloned())
    }

    async fn list_pipeline_versions(
        &self,
        pipeline_id: &str,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<PipelineVersion>> {
        let state = self.lock_checked("pipeline_version.list")?;
        let items: Vec<PipelineVersion> = state
            .versions
            .values()
            .filter(|v| v.pipeline_id == pipeline_id && v.status == PipelineStatus::Ready)
            .cloned()
            .collect();
        let items = sorted(items, |v| (v.created_at, v.id.clone()), opts);
        opts.paginate(&items)
    }

    async fn delete_pipeline_version(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("pipeline_version.delete")?;
        state.versions.remove(id);
        Ok(())
    }

    async fn update_pipeline_version_status(
        &self,
        id: &str,
        status: PipelineStatus,
    ) -> PipelineResult<()> {
        let mut state = self.lock_checked("pipeline_version.update_status")?;
        let version = state
            .versions
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("pipeline version", id))?;
        version.status = status;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn create(&self, job: &Job) -> PipelineResult<Job> {
        let mut state = self.lock_checked("job.create")?;
        if state.jobs.contains_key(&job.id) {
            return Err(PipelineError::already_exists("job", &job.id));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job.clone())
    }

    async fn get(&self, id: &str) -> PipelineResult<Option<Job>> {
        let state = self.lock_checked("job.get")?;
        Ok(state
            .jobs
            .get(id)
            .filter(|j| j.status == JobStatus::Ready)
            .cloned())
    }

    async fn list(&self, filter: &FilterContext, opts: &ListOptions) -> PipelineResult<ListPage<Job>> {
        let state = self.lock_checked("job.list")?;
        let items: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Ready)
            .filter(|j| match &filter.reference_key {
                Some(key) if key.resource_type == ResourceType::Namespace => j.namespace == key.id,
                _ => references_key(&j.resource_references, filter),
            })
            .cloned()
            .collect();
        let items = sorted(items, |j| (j.created_at, j.id.clone()), opts);
        opts.paginate(&items)
    }

    async fn enable(&self, id: &str, enabled: bool, updated_at: i64) -> PipelineResult<()> {
        let mut state = self.lock_checked("job.enable")?;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("job", id))?;
        job.enabled = enabled;
        job.updated_at = updated_at;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: JobStatus) -> PipelineResult<()> {
        let mut state = self.lock_checked("job.update_status")?;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("job", id))?;
        job.status = status;
        Ok(())
    }

    async fn update_from_report(&self, report: &Job) -> PipelineResult<()> {
        let mut state = self.lock_checked("job.update_from_report")?;
        let job = state
            .jobs
            .get_mut(&report.id)
            .ok_or_else(|| PipelineError::not_found("job", &report.id))?;
        job.enabled = report.enabled;
        job.conditions = report.conditions.clone();
        job.trigger = report.trigger.clone();
        job.max_concurrency = report.max_concurrency;
        job.no_catchup = report.no_catchup;
        job.updated_at = report.updated_at;
        Ok(())
    }

    async fn delete(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("job.delete")?;
        state.jobs.remove(id);
        Ok(())
    }
}

#[async_trait]
impl RunRepository for InMemoryStore {
    async fn create(&self, run: &Run) -> PipelineResult<Run> {
        let mut state = self.lock_checked("run.create")?;
        if state.runs.contains_key(&run.id) {
            return Err(PipelineError::already_exists("run", &run.id));
        }
        state.runs.insert(run.id.clone(), run.clone());
        state.run_writes += 1;
        Ok(run.clone())
    }

    async fn get(&self, id: &str) -> PipelineResult<Option<Run>> {
        let state = self.lock_checked("run.get")?;
        Ok(state.runs.get(id).cloned())
    }

    async fn list(&self, filter: &FilterContext, opts: &ListOptions) -> PipelineResult<ListPage<Run>> {
        let state = self.lock_checked("run.list")?;
        let items: Vec<Run> = state
            .runs
            .values()
            .filter(|r| match &filter.reference_key {
                Some(key) if key.resource_type == ResourceType::Namespace => r.namespace == key.id,
                Some(key) if key.resource_type == ResourceType::Experiment => {
                    r.experiment_id == key.id
                }
                _ => references_key(&r.resource_references, filter),
            })
            .cloned()
            .collect();
        let items = sorted(items, |r| (r.created_at, r.id.clone()), opts);
        opts.paginate(&items)
    }

    async fn update(
        &self,
        id: &str,
        condition: &str,
        finished_at: i64,
        runtime_manifest: &str,
    ) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.update")?;
        let run = state
            .runs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("run", id))?;
        run.conditions = condition.to_string();
        run.finished_at = finished_at;
        run.workflow_runtime_manifest = runtime_manifest.to_string();
        state.run_writes += 1;
        Ok(())
    }

    async fn create_or_update(&self, run: &Run) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.create_or_update")?;
        match state.runs.get_mut(&run.id) {
            Some(existing) => {
                existing.conditions = run.conditions.clone();
                existing.finished_at = run.finished_at;
                existing.workflow_runtime_manifest = run.workflow_runtime_manifest.clone();
            }
            None => {
                state.runs.insert(run.id.clone(), run.clone());
            }
        }
        state.run_writes += 1;
        Ok(())
    }

    async fn archive(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.archive")?;
        let run = state
            .runs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("run", id))?;
        run.storage_state = StorageState::Archived;
        Ok(())
    }

    async fn unarchive(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.unarchive")?;
        let run = state
            .runs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("run", id))?;
        run.storage_state = StorageState::Available;
        Ok(())
    }

    async fn delete(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.delete")?;
        state
            .runs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PipelineError::not_found("run", id))
    }

    async fn terminate(&self, id: &str) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.terminate")?;
        let run = state
            .runs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("run", id))?;
        if !matches!(run.conditions.as_str(), "" | "Running" | "Pending") {
            return Err(PipelineError::BadRequest(format!(
                "Run {id} is not running (condition {})",
                run.conditions
            )));
        }
        run.conditions = "Terminating".to_string();
        Ok(())
    }

    async fn report_metric(&self, metric: &RunMetric) -> PipelineResult<()> {
        let mut state = self.lock_checked("run.report_metric")?;
        let duplicate = state.metrics.iter().any(|m| {
            m.run_id == metric.run_id && m.node_id == metric.node_id && m.name == metric.name
        });
        if duplicate {
            return Err(PipelineError::already_exists(
                "run metric",
                format!("{}/{}/{}", metric.run_id, metric.node_id, metric.name),
            ));
        }
        state.metrics.push(metric.clone());
        Ok(())
    }
}

#[async_trait]
impl ResourceReferenceRepository for InMemoryStore {
    async fn get(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        reference_type: ResourceType,
    ) -> PipelineResult<Option<ResourceReference>> {
        let state = self.lock_checked("reference.get")?;
        let references = match resource_type {
            ResourceType::Job => state.jobs.get(resource_id).map(|j| &j.resource_references),
            ResourceType::Run => state.runs.get(resource_id).map(|r| &r.resource_references),
            _ => None,
        };
        Ok(references.and_then(|refs| {
            refs.iter()
                .find(|r| r.reference_type == reference_type)
                .cloned()
        }))
    }
}
