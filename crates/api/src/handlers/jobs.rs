use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use pipeline_domain::JobRequest;

use crate::{
    error::ApiResult,
    handlers::ListQuery,
    response::{created, ok_empty, success, ListResponse},
    routes::{AppState, Scope},
};

const RESOURCE: &str = "jobs";

pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<JobRequest>,
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
    let job = state.manager.create_job(&request).await?;
    Ok(created(job))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, query.scope(), "list", RESOURCE, "")
        .await?;
    let page = state
        .manager
        .list_jobs(&query.filter(), &query.options())
        .await?;
    Ok(success(ListResponse::from(page)))
}

pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Job(&id), "get", RESOURCE, &id)
        .await?;
    Ok(success(state.manager.get_job(&id).await?))
}

pub async fn delete_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Job(&id), "delete", RESOURCE, &id)
        .await?;
    state.manager.delete_job(&id).await?;
    Ok(ok_empty())
}

pub async fn enable_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Job(&id), "enable", RESOURCE, &id)
        .await?;
    state.manager.enable_job(&id, true).await?;
    Ok(ok_empty())
}

pub async fn disable_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Job(&id), "disable", RESOURCE, &id)
        .await?;
    state.manager.enable_job(&id, false).await?;
    Ok(ok_empty())
}
