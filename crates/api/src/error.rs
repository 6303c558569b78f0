use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline_core::{ErrorKind, PipelineError};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(err) => status_for(err),
        }
    }

    fn error_type(&self) -> String {
        match self {
            ApiError::BadRequest(_) => ErrorKind::InvalidInput.to_string(),
            ApiError::Pipeline(err) => err.kind().to_string(),
        }
    }
}

/// An aggregate answers with its members' status when they all agree, as
/// when every identity provider rejected the request.
fn status_for(err: &PipelineError) -> StatusCode {
    match err.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Aggregate => {
            let PipelineError::Aggregate(errors) = err else {
                return StatusCode::INTERNAL_SERVER_ERROR;
            };
            let mut statuses = errors.iter().map(status_for);
            match statuses.next() {
                Some(first) if statuses.all(|s| s == first) => first,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
