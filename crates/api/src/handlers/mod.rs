pub mod experiments;
pub mod health;
pub mod jobs;
pub mod pipelines;
pub mod reports;
pub mod runs;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use pipeline_domain::{FilterContext, ListOptions, ResourceType};
use serde::Deserialize;

use crate::routes::Scope;

/// Paging and filtering parameters shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
    pub namespace: Option<String>,
    pub experiment_id: Option<String>,
}

impl ListQuery {
    pub fn options(&self) -> ListOptions {
        let defaults = ListOptions::default();
        ListOptions {
            page_size: self.page_size.unwrap_or(defaults.page_size),
            page_token: self.page_token.clone(),
            sort_by: self.sort_by.clone().unwrap_or(defaults.sort_by),
            descending: self.descending.unwrap_or(defaults.descending),
        }
    }

    /// An experiment filter wins over a namespace filter.
    pub fn filter(&self) -> FilterContext {
        match (&self.experiment_id, &self.namespace) {
            (Some(id), _) if !id.is_empty() => FilterContext::by(ResourceType::Experiment, id),
            (_, Some(namespace)) if !namespace.is_empty() => {
                FilterContext::by(ResourceType::Namespace, namespace)
            }
            _ => FilterContext::default(),
        }
    }

    pub fn scope(&self) -> Scope<'_> {
        match &self.experiment_id {
            Some(id) if !id.is_empty() => Scope::Experiment(id),
            _ => Scope::Namespace(self.namespace.as_deref().unwrap_or_default()),
        }
    }
}

pub(crate) fn yaml(bytes: Vec<u8>) -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/x-yaml")], bytes)
}

pub(crate) fn plain_text(bytes: Vec<u8>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        bytes,
    )
}

pub(crate) fn octet_stream(bytes: Vec<u8>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query = ListQuery::default();
        assert_eq!(query.options(), ListOptions::default());
        assert_eq!(query.filter(), FilterContext::default());
    }

    #[test]
    fn test_experiment_filter_wins_over_namespace() {
        let query = ListQuery {
            namespace: Some("team-a".to_string()),
            experiment_id: Some("exp-1".to_string()),
            page_size: Some(5),
            descending: Some(true),
            ..ListQuery::default()
        };
        assert_eq!(query.filter(), FilterContext::by(ResourceType::Experiment, "exp-1"));
        assert!(matches!(query.scope(), Scope::Experiment("exp-1")));
        let options = query.options();
        assert_eq!(options.page_size, 5);
        assert!(options.descending);
        assert_eq!(options.sort_by, "created_at");
    }

    #[test]
    fn test_empty_experiment_falls_back_to_namespace() {
        let query = ListQuery {
            namespace: Some("team-a".to_string()),
            experiment_id: Some(String::new()),
            ..ListQuery::default()
        };
        assert_eq!(query.filter(), FilterContext::by(ResourceType::Namespace, "team-a"));
        assert!(matches!(query.scope(), Scope::Namespace("team-a")));
    }
}
