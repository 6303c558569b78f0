use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use pipeline_domain::{PipelineVersionRequest, Relationship, ResourceRef, ResourceType};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    handlers::{yaml, ListQuery},
    response::{created, ok_empty, success, ListResponse},
    routes::{AppState, Scope},
};

const PIPELINES: &str = "pipelines";
const VERSIONS: &str = "pipelineversions";

#[derive(Debug, Deserialize)]
pub struct UploadPipelineQuery {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadVersionQuery {
    pub name: Option<String>,
    pub pipelineid: Option<String>,
    #[serde(default)]
    pub code_source_url: String,
    pub update_default: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct VersionListQuery {
    pub pipeline_id: String,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Query parameter '{field}' is required")))
}

/// Stores the uploaded template as a new pipeline with one version.
pub async fn upload_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UploadPipelineQuery>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let name = required(query.name, "name")?;
    state
        .authorize(
            &headers,
            Scope::Namespace(&query.namespace),
            "create",
            PIPELINES,
            &name,
        )
        .await?;
    let pipeline = state
        .manager
        .create_pipeline(&name, &query.description, &query.namespace, &body)
        .await?;
    Ok(created(pipeline))
}

pub async fn list_pipelines(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, query.scope(), "list", PIPELINES, "")
        .await?;
    let page = state
        .manager
        .list_pipelines(&query.filter(), &query.options())
        .await?;
    Ok(success(ListResponse::from(page)))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Pipeline(&id), "get", PIPELINES, &id)
        .await?;
    Ok(success(state.manager.get_pipeline(&id).await?))
}

pub async fn delete_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Pipeline(&id), "delete", PIPELINES, &id)
        .await?;
    state.manager.delete_pipeline(&id).await?;
    Ok(ok_empty())
}

pub async fn get_pipeline_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Pipeline(&id), "get", PIPELINES, &id)
        .await?;
    Ok(yaml(state.manager.get_pipeline_template(&id).await?))
}

pub async fn update_default_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, version_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Pipeline(&id), "update", PIPELINES, &id)
        .await?;
    state
        .manager
        .update_pipeline_default_version(&id, &version_id)
        .await?;
    Ok(ok_empty())
}

/// Stores the uploaded template as a version of an existing pipeline. The
/// new version becomes the default unless `update_default=false`.
pub async fn upload_pipeline_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UploadVersionQuery>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let name = required(query.name, "name")?;
    let pipeline_id = required(query.pipelineid, "pipelineid")?;
    state
        .authorize(&headers, Scope::Pipeline(&pipeline_id), "create", VERSIONS, &name)
        .await?;
    let request = PipelineVersionRequest {
        name,
        code_source_url: query.code_source_url,
        resource_references: vec![ResourceRef::new(
            ResourceType::Pipeline,
            pipeline_id,
            Relationship::Owner,
        )],
    };
    let version = state
        .manager
        .create_pipeline_version(&request, &body, query.update_default.unwrap_or(true))
        .await?;
    Ok(created(version))
}

pub async fn list_pipeline_versions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VersionListQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(
            &headers,
            Scope::Pipeline(&query.pipeline_id),
            "list",
            VERSIONS,
            "",
        )
        .await?;
    let options = ListQuery {
        page_size: query.page_size,
        page_token: query.page_token.clone(),
        sort_by: query.sort_by.clone(),
        descending: query.descending,
        ..ListQuery::default()
    }
    .options();
    let page = state
        .manager
        .list_pipeline_versions(&query.pipeline_id, &options)
        .await?;
    Ok(success(ListResponse::from(page)))
}

pub async fn get_pipeline_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::PipelineVersion(&id), "get", VERSIONS, &id)
        .await?;
    Ok(success(state.manager.get_pipeline_version(&id).await?))
}

pub async fn delete_pipeline_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::PipelineVersion(&id), "delete", VERSIONS, &id)
        .await?;
    state.manager.delete_pipeline_version(&id).await?;
    Ok(ok_empty())
}

pub async fn get_pipeline_version_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::PipelineVersion(&id), "get", VERSIONS, &id)
        .await?;
    Ok(yaml(state.manager.get_pipeline_version_template(&id).await?))
}
