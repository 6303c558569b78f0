use axum::{http::StatusCode, response::IntoResponse, Json};
use pipeline_domain::ListPage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_empty() -> Self {
        Self {
            success: true,
            data: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// One page of a listing. `next_page_token` is absent on the last page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl<T> From<ListPage<T>> for ListResponse<T> {
    fn from(page: ListPage<T>) -> Self {
        Self {
            items: page.items,
            total_size: page.total_size,
            next_page_token: page.next_page_token,
        }
    }
}

pub fn success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, ApiResponse::success(data))
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, ApiResponse::success(data))
}

pub fn ok_empty() -> impl IntoResponse {
    (StatusCode::OK, ApiResponse::success_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_response_from_page() {
        let page = ListPage {
            items: vec!["a", "b"],
            total_size: 5,
            next_page_token: Some("2".to_string()),
        };
        let response = ListResponse::from(page);
        assert_eq!(response.items, vec!["a", "b"]);
        assert_eq!(response.total_size, 5);

        let json = serde_json::to_value(ListResponse::<u8> {
            items: vec![],
            total_size: 0,
            next_page_token: None,
        })
        .unwrap();
        assert!(json.get("next_page_token").is_none());
    }

    #[test]
    fn test_empty_response_has_no_data() {
        let response = ApiResponse::success_empty();
        assert!(response.success);
        assert!(response.data.is_none());
    }
}
