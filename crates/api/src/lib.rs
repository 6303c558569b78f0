//! HTTP surface of the pipeline resource manager.
//!
//! Every endpoint is a thin translation of a request into one
//! [`ResourceManager`](pipeline_manager::ResourceManager) operation. When
//! authorization is enabled the caller's identity and the resource's
//! namespace are checked before the operation runs.
//!
//! Endpoints live under `/apis/v1beta1`: experiments, pipelines and
//! pipeline versions, runs, jobs, and the controller status reports.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::time::Duration;

use axum::Router;
use pipeline_core::config::ApiConfig;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use middleware::{cors_layer, request_logging, trace_layer};

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState, Scope};

/// Builds the full application with the request middleware stack.
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_seconds,
            ))),
    )
}
