use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use pipeline_domain::ExperimentRequest;

use crate::{
    error::ApiResult,
    handlers::ListQuery,
    response::{created, ok_empty, success, ListResponse},
    routes::{AppState, Scope},
};

const RESOURCE: &str = "experiments";

pub async fn create_experiment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExperimentRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(
            &headers,
            Scope::Namespace(request.namespace()),
            "create",
            RESOURCE,
            &request.name,
        )
        .await?;
    let experiment = state.manager.create_experiment(&request).await?;
    Ok(created(experiment))
}

pub async fn list_experiments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, query.scope(), "list", RESOURCE, "")
        .await?;
    let page = state
        .manager
        .list_experiments(&query.filter(), &query.options())
        .await?;
    Ok(success(ListResponse::from(page)))
}

pub async fn get_experiment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Experiment(&id), "get", RESOURCE, &id)
        .await?;
    Ok(success(state.manager.get_experiment(&id).await?))
}

pub async fn delete_experiment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Experiment(&id), "delete", RESOURCE, &id)
        .await?;
    state.manager.delete_experiment(&id).await?;
    Ok(ok_empty())
}

/// Archives the experiment together with its runs and disables its jobs.
pub async fn archive_experiment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Experiment(&id), "archive", RESOURCE, &id)
        .await?;
    state.manager.archive_experiment(&id).await?;
    Ok(ok_empty())
}

pub async fn unarchive_experiment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(&headers, Scope::Experiment(&id), "unarchive", RESOURCE, &id)
        .await?;
    state.manager.unarchive_experiment(&id).await?;
    Ok(ok_empty())
}
