use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Every non-2xx answer the HTTP surface produces. Bodies always carry a
/// `detail` string.
#[derive(Debug)]
pub enum ApiError {
    NotFound { job_id: String },
    Backend(String),
    Validation(String),
    /// Artifact delivery on a job that finished without something to deliver.
    JobFailed { job_id: String, status: String },
    /// Artifact delivery whose wait expired.
    Timeout { job_id: String, timeout: u64 },
    BadHost,
    RouteNotFound,
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation(_) | ApiError::JobFailed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BadHost => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ApiError::NotFound { job_id } => json!({
                "detail": format!("Job {} not found", job_id),
                "job_id": job_id,
            }),
            ApiError::Backend(detail) | ApiError::Validation(detail) => json!({ "detail": detail }),
            ApiError::JobFailed { job_id, status } => json!({
                "detail": format!("Job {} failed with status: {}", job_id, status),
                "job_id": job_id,
                "status": status,
            }),
            ApiError::Timeout { job_id, timeout } => json!({
                "detail": format!("Job {} timed out after {} seconds", job_id, timeout),
                "job_id": job_id,
                "timeout": timeout,
            }),
            ApiError::BadHost => json!({ "detail": "Invalid host header" }),
            ApiError::RouteNotFound => json!({ "detail": "Not Found" }),
            ApiError::Internal => json!({ "detail": "internal error" }),
        };
        (status, Json(body)).into_response()
    }
}
