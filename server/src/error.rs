//! Error responses of the audit API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use vantage_db::DatabaseError;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// A 500 whose message names the failed operation, e.g. `Finalization failed: ...`.
    pub fn failed(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Internal(format!("{operation} failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::InvalidInput(msg) | DatabaseError::Decode(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (status, body) = render(ApiError::BadRequest("auditId is required.".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "auditId is required.");

        let (status, _) = render(ApiError::NotFound("Audit not found.".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = render(ApiError::failed("Finalization", "disk full")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Finalization failed: disk full");
    }

    #[test]
    fn test_database_error_conversion() {
        let err: ApiError = DatabaseError::InvalidInput("report must be a JSON object".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = DatabaseError::Migration("boom".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
