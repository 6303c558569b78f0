use std::sync::Arc;

use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use pipeline_domain::ports::ResourceAttributes;
use pipeline_domain::{find_reference, Relationship, ResourceRef, ResourceType};
use pipeline_manager::ResourceManager;

use crate::error::ApiResult;
use crate::handlers::{experiments, health, jobs, pipelines, reports, runs};
use crate::middleware::request_context;

/// API group checked by the access reviews.
pub const RBAC_GROUP: &str = "pipelines.kubeflow.org";
pub const RBAC_VERSION: &str = "v1beta1";

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ResourceManager>,
    pub auth_enabled: bool,
}

impl AppState {
    pub fn new(manager: Arc<ResourceManager>, auth_enabled: bool) -> Self {
        Self {
            manager,
            auth_enabled,
        }
    }

    /// Authenticates the caller and checks `verb` on `resource` in the
    /// namespace of `scope`. A no-op when authorization is switched off.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        scope: Scope<'_>,
        verb: &str,
        resource: &str,
        name: &str,
    ) -> ApiResult<()> {
        if !self.auth_enabled {
            return Ok(());
        }
        let namespace = self.namespace_of(scope).await?;
        let attributes = ResourceAttributes {
            namespace,
            verb: verb.to_string(),
            group: RBAC_GROUP.to_string(),
            version: RBAC_VERSION.to_string(),
            resource: resource.to_string(),
            subresource: String::new(),
            name: name.to_string(),
        };
        self.manager
            .is_request_authorized(&request_context(headers), &attributes)
            .await?;
        Ok(())
    }

    async fn namespace_of(&self, scope: Scope<'_>) -> ApiResult<String> {
        let manager = &self.manager;
        let namespace = match scope {
            Scope::Namespace(namespace) => namespace.to_string(),
            Scope::Experiment(id) => manager.get_namespace_from_experiment_id(id).await?,
            Scope::Run(id) => manager.get_namespace_from_run_id(id).await?,
            Scope::Job(id) => manager.get_namespace_from_job_id(id).await?,
            Scope::Pipeline(id) => manager.get_namespace_from_pipeline_id(id).await?,
            Scope::PipelineVersion(id) => manager.get_namespace_from_pipeline_version_id(id).await?,
            Scope::References(references) => {
                if find_reference(references, ResourceType::Experiment, Relationship::Owner)
                    .is_some()
                {
                    manager.resolve_namespace(references).await?
                } else {
                    String::new()
                }
            }
        };
        Ok(namespace)
    }
}

/// What an authorization check is scoped by; resolved to a namespace only
/// when authorization is on.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Namespace(&'a str),
    Experiment(&'a str),
    Run(&'a str),
    Job(&'a str),
    Pipeline(&'a str),
    PipelineVersion(&'a str),
    References(&'a [ResourceRef]),
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Experiments
        .route(
            "/apis/v1beta1/experiments",
            get(experiments::list_experiments).post(experiments::create_experiment),
        )
        .route(
            "/apis/v1beta1/experiments/{id}",
            get(experiments::get_experiment).delete(experiments::delete_experiment),
        )
        .route(
            "/apis/v1beta1/experiments/{id}/archive",
            post(experiments::archive_experiment),
        )
        .route(
            "/apis/v1beta1/experiments/{id}/unarchive",
            post(experiments::unarchive_experiment),
        )
        // Pipelines and versions
        .route("/apis/v1beta1/pipelines", get(pipelines::list_pipelines))
        .route("/apis/v1beta1/pipelines/upload", post(pipelines::upload_pipeline))
        .route(
            "/apis/v1beta1/pipelines/{id}",
            get(pipelines::get_pipeline).delete(pipelines::delete_pipeline),
        )
        .route(
            "/apis/v1beta1/pipelines/{id}/templates",
            get(pipelines::get_pipeline_template),
        )
        .route(
            "/apis/v1beta1/pipelines/{id}/default_version/{version_id}",
            post(pipelines::update_default_version),
        )
        .route(
            "/apis/v1beta1/pipeline_versions",
            get(pipelines::list_pipeline_versions),
        )
        .route(
            "/apis/v1beta1/pipeline_versions/upload",
            post(pipelines::upload_pipeline_version),
        )
        .route(
            "/apis/v1beta1/pipeline_versions/{id}",
            get(pipelines::get_pipeline_version).delete(pipelines::delete_pipeline_version),
        )
        .route(
            "/apis/v1beta1/pipeline_versions/{id}/templates",
            get(pipelines::get_pipeline_version_template),
        )
        // Runs
        .route("/apis/v1beta1/runs", get(runs::list_runs).post(runs::create_run))
        .route(
            "/apis/v1beta1/runs/{id}",
            get(runs::get_run).delete(runs::delete_run),
        )
        .route("/apis/v1beta1/runs/{id}/archive", post(runs::archive_run))
        .route("/apis/v1beta1/runs/{id}/unarchive", post(runs::unarchive_run))
        .route("/apis/v1beta1/runs/{id}/terminate", post(runs::terminate_run))
        .route("/apis/v1beta1/runs/{id}/retry", post(runs::retry_run))
        .route("/apis/v1beta1/runs/{id}/metrics", post(runs::report_run_metric))
        .route(
            "/apis/v1beta1/runs/{id}/nodes/{node_id}/log",
            get(runs::read_log),
        )
        .route(
            "/apis/v1beta1/runs/{id}/nodes/{node_id}/artifacts/{artifact_name}",
            get(runs::read_artifact),
        )
        // Jobs
        .route("/apis/v1beta1/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/apis/v1beta1/jobs/{id}",
            get(jobs::get_job).delete(jobs::delete_job),
        )
        .route("/apis/v1beta1/jobs/{id}/enable", post(jobs::enable_job))
        .route("/apis/v1beta1/jobs/{id}/disable", post(jobs::disable_job))
        // Controller status reports
        .route("/apis/v1beta1/workflows", post(reports::report_workflow))
        .route(
            "/apis/v1beta1/scheduledworkflows",
            post(reports::report_scheduled_workflow),
        )
        .with_state(state)
}
