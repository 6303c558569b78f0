//! Status reports pushed by the cluster controllers.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use pipeline_domain::{ScheduledWorkflow, Workflow};

use crate::{
    error::ApiResult,
    response::ok_empty,
    routes::{AppState, Scope},
};

pub async fn report_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(workflow): Json<Workflow>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(
            &headers,
            Scope::Namespace(workflow.namespace()),
            "report",
            "workflows",
            workflow.name(),
        )
        .await?;
    state.manager.report_workflow(&workflow).await?;
    Ok(ok_empty())
}

pub async fn report_scheduled_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(definition): Json<ScheduledWorkflow>,
) -> ApiResult<impl IntoResponse> {
    state
        .authorize(
            &headers,
            Scope::Namespace(&definition.metadata.namespace),
            "report",
            "scheduledworkflows",
            &definition.metadata.name,
        )
        .await?;
    state.manager.report_scheduled_workflow(&definition).await?;
    Ok(ok_empty())
}
