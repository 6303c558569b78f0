use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use pipeline_domain::{RunMetric, RunRequest};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    handlers::{octet_stream, plain_text, ListQuery},
    response::{created, ok_empty, success, ListResponse},
    routes::{AppState, Scope},
};

const RESOURCE: &str = "runs";

/// Metric as reported by a task; the run comes from the path.
#[derive(Debug, Deserialize)]
pub struct MetricBody {
    pub node_id: String,
    pub name: String,
    pub number_value: f64,
    #[serde(default = "raw_format")]
    pub format: String,
}

fn raw_format() -> String {
    "RAW".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub follow: bool,
}

pub async fn create_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RunRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(
            &headers,
            Scope::References(&request.resource_references),
            "create",
            RESOURCE,
            &request.name,
        )
        .await?;
    let run = state.manager.create_run(&request).await?;
    Ok(created(run))
}

pub async fn list_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, query.scope(), "list", RESOURCE, "")
        .await?;
    let page = state
        .manager
        .list_runs(&query.filter(), &query.options())
        .await?;
    Ok(success(ListResponse::from(page)))
}

pub async fn get_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "get", RESOURCE, &id)
        .await?;
    Ok(success(state.manager.get_run(&id).await?))
}

pub async fn delete_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "delete", RESOURCE, &id)
        .await?;
    state.manager.delete_run(&id).await?;
    Ok(ok_empty())
}

pub async fn archive_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "archive", RESOURCE, &id)
        .await?;
    state.manager.archive_run(&id).await?;
    Ok(ok_empty())
}

pub async fn unarchive_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "unarchive", RESOURCE, &id)
        .await?;
    state.manager.unarchive_run(&id).await?;
    Ok(ok_empty())
}

pub async fn terminate_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "terminate", RESOURCE, &id)
        .await?;
    state.manager.terminate_run(&id).await?;
    Ok(ok_empty())
}

pub async fn retry_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "retry", RESOURCE, &id)
        .await?;
    state.manager.retry_run(&id).await?;
    Ok(ok_empty())
}

pub async fn report_run_metric(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MetricBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "reportMetrics", RESOURCE, &id)
        .await?;
    let metric = RunMetric {
        run_id: id.clone(),
        node_id: body.node_id,
        name: body.name,
        number_value: body.number_value,
        format: body.format,
    };
    state.manager.report_run_metric(&id, &metric).await?;
    Ok(ok_empty())
}

/// Task log, served live from the pod while it exists and from the
/// archive afterwards.
pub async fn read_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, node_id)): Path<(String, String)>,
    Query(query): Query<LogQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "readLog", RESOURCE, &id)
        .await?;
    let log = state.manager.read_log(&id, &node_id, query.follow).await?;
    Ok(plain_text(log))
}

pub async fn read_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, node_id, artifact_name)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Run(&id), "readArtifact", RESOURCE, &id)
        .await?;
    let artifact = state
        .manager
        .read_artifact(&id, &node_id, &artifact_name)
        .await?;
    Ok(octet_stream(artifact))
}
