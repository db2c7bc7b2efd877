use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dining_common::error::LlmClientError;
use serde_json::json;

use crate::eta::MatrixError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("missing_api_key")]
    MissingApiKey,

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Llm(#[from] LlmClientError),

    #[error("all ranking backends failed: {0}")]
    RankingUnavailable(String),

    #[error("unparseable ranking response: {0}")]
    RankingParse(String),

    #[error("invalid_origin")]
    InvalidOrigin,

    #[error("invalid_json")]
    InvalidJson,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("payload_too_large")]
    PayloadTooLarge,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidOrigin | AppError::InvalidJson | AppError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RankingUnavailable(_) | AppError::RankingParse(_) | AppError::Llm(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_)
            | AppError::StorageUnavailable(_)
            | AppError::Query(_)
            | AppError::MissingApiKey
            | AppError::Matrix(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attach an endpoint-level message. Server errors render as `{error: message, details}`.
    pub fn described(self, message: &'static str) -> DescribedError {
        DescribedError {
            message,
            source: self,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::StorageUnavailable(_) | AppError::Query(_) => {
                json!({ "error": "storage_error", "details": self.to_string() })
            }
            AppError::RankingUnavailable(_) => {
                json!({ "error": "ranking_unavailable", "details": self.to_string() })
            }
            AppError::RankingParse(_) => {
                json!({ "error": "ranking_parse_error", "details": self.to_string() })
            }
            AppError::Llm(e) => json!({ "error": "llm_error", "details": e.to_string() }),
            AppError::Config(_) => json!({ "error": "config_error", "details": self.to_string() }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug)]
pub struct DescribedError {
    message: &'static str,
    source: AppError,
}

impl IntoResponse for DescribedError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        if status.is_client_error() {
            return self.source.into_response();
        }
        let body = json!({ "error": self.message, "details": self.source.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn matrix_error_embeds_upstream_status() {
        let response = AppError::from(MatrixError::Http(503)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({ "error": "matrix_http_503" }));
    }

    #[tokio::test]
    async fn described_storage_error_has_details() {
        let response = AppError::StorageUnavailable("connection refused".to_string())
            .described("Failed to fetch dining halls")
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "Failed to fetch dining halls",
                "details": "storage unavailable: connection refused"
            })
        );
    }

    #[tokio::test]
    async fn described_client_error_keeps_its_own_message() {
        let response = AppError::InvalidRequest("Date parameter is required".to_string())
            .described("Failed to fetch dining hall menu")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Date parameter is required" })
        );
    }
}
