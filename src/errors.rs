use crate::services::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Error returned by every handler; rendered as `{error, details?, required?}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
    pub required: Option<Vec<String>>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
            required: None,
        }
    }

    /// Shortcut for a 400 Bad Request (validation failures).
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    /// 400 listing the missing fields under `required`.
    pub fn missing_fields(missing: Vec<&str>) -> Self {
        let mut err = Self::bad_request("Missing required fields");
        err.required = Some(missing.into_iter().map(str::to_string).collect());
        err
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<&'a [String]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: &self.message,
            details: self.details.as_deref(),
            required: self.required.as_deref(),
        });

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey => AppError::bad_request("Invalid file key"),
            StoreError::InvalidPrefix(prefix) => {
                AppError::bad_request(format!("Invalid listing prefix `{}`", prefix))
            }
            other => AppError::internal("Storage operation failed").with_details(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal("Database operation failed").with_details(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal("Internal server error").with_details(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_fields_lists_required() {
        let (status, body) = body_json(AppError::missing_fields(vec!["filename", "courseId"])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");
        assert_eq!(body["required"], serde_json::json!(["filename", "courseId"]));
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn backend_failures_keep_the_underlying_message() {
        let err: AppError = StoreError::Backend("connection reset".into()).into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], "store backend error: connection reset");
    }

    #[tokio::test]
    async fn invalid_key_maps_to_bad_request() {
        let err: AppError = StoreError::InvalidKey.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
