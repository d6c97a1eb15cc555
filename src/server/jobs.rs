use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::errors::ApiError;
use super::AppState;
use crate::models::{JobRecord, JobStatus, JobStatusResponse, WaitResult};
use crate::service::{
    MAX_MAX_WAIT_SECS, MAX_POLL_INTERVAL_SECS, MIN_MAX_WAIT_SECS, MIN_POLL_INTERVAL_SECS,
};

const X_ACCEL_REDIRECT: HeaderName = HeaderName::from_static("x-accel-redirect");

// ---------------------------------------------------------------------------
// Query params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
}

fn default_max_wait_time() -> u64 {
    300
}

fn default_poll_interval() -> f64 {
    1.0
}

impl WaitParams {
    /// Check bounds and convert to durations.
    pub fn validate(&self) -> Result<(Duration, Duration), ApiError> {
        if !(MIN_MAX_WAIT_SECS..=MAX_MAX_WAIT_SECS).contains(&self.max_wait_time) {
            return Err(ApiError::Validation(format!(
                "max_wait_time must be between {} and {} seconds",
                MIN_MAX_WAIT_SECS, MAX_MAX_WAIT_SECS
            )));
        }
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval) {
            return Err(ApiError::Validation(format!(
                "poll_interval must be between {} and {} seconds",
                MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS
            )));
        }
        Ok((
            Duration::from_secs(self.max_wait_time),
            Duration::from_secs_f64(self.poll_interval),
        ))
    }
}

fn parse_wait_params(
    params: Result<Query<WaitParams>, QueryRejection>,
) -> Result<(u64, Duration, Duration), ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let (max_wait, poll_interval) = params.validate()?;
    Ok((params.max_wait_time, max_wait, poll_interval))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /job/{id}/status
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let record = state
        .service
        .get(&job_id)
        .await
        .map_err(|e| state.job_error(e))?;

    Ok(Json(JobStatusResponse {
        job_id,
        worker_id: state.settings.worker_id.clone(),
        record,
    }))
}

/// GET /job/{id}/wait
pub async fn wait_for_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    params: Result<Query<WaitParams>, QueryRejection>,
) -> Result<Json<WaitResult>, ApiError> {
    let (_, max_wait, poll_interval) = parse_wait_params(params)?;
    let result = state
        .service
        .wait(&job_id, max_wait, poll_interval)
        .await
        .map_err(|e| state.job_error(e))?;
    Ok(Json(result))
}

/// GET /job/{id}/download
///
/// Waits like `/wait`, then answers with the artifact itself: the stored
/// `output_json` for JSON results, or an `X-Accel-Redirect` to the file for
/// the fronting proxy to serve.
pub async fn download_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    params: Result<Query<WaitParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let (timeout, max_wait, poll_interval) = parse_wait_params(params)?;
    let result = state
        .service
        .wait(&job_id, max_wait, poll_interval)
        .await
        .map_err(|e| state.job_error(e))?;

    if result.timed_out {
        return Err(ApiError::Timeout { job_id, timeout });
    }

    let record = result.record;
    let status = record.status;
    match status {
        JobStatus::Completed if record.has_artifact() => artifact_response(&job_id, record),
        JobStatus::Completed => Err(ApiError::JobFailed {
            job_id,
            status: "COMPLETED_NO_DATA".to_string(),
        }),
        other => Err(ApiError::JobFailed {
            job_id,
            status: other.to_string(),
        }),
    }
}

fn artifact_response(job_id: &str, record: JobRecord) -> Result<Response, ApiError> {
    let is_json = record.content_type.as_deref() == Some("application/json");
    let url = record.url.as_deref().filter(|u| !u.is_empty());

    match (record.output_json, url) {
        (Some(output), _) if is_json => Ok(Json(output).into_response()),
        (_, Some(url)) => {
            let redirect = accel_redirect_path(url).ok_or_else(|| {
                tracing::error!("Job '{}' has an unusable artifact url '{}'", job_id, url);
                ApiError::Internal
            })?;
            let content_type = record
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let file_name = record
                .file_name
                .or_else(|| url.rsplit('/').next().map(str::to_string))
                .unwrap_or_default();

            let mut headers = HeaderMap::new();
            headers.insert(X_ACCEL_REDIRECT, header_value(&redirect)?);
            headers.insert(CONTENT_TYPE, header_value(&content_type)?);
            headers.insert(
                CONTENT_DISPOSITION,
                header_value(&format!("attachment; filename={}", file_name))?,
            );
            Ok((StatusCode::OK, headers, "").into_response())
        }
        (Some(output), None) => Ok(Json(output).into_response()),
        (None, None) => Err(ApiError::JobFailed {
            job_id: job_id.to_string(),
            status: "COMPLETED_NO_DATA".to_string(),
        }),
    }
}

/// `https://bucket.host/a/b.csv?sig=1` becomes
/// `/userfiles/https/bucket.host/a/b.csv?sig=1`.
pub fn accel_redirect_path(raw: &str) -> Option<String> {
    let url = reqwest::Url::parse(raw).ok()?;
    let host = url.host_str()?;
    let netloc = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let origin = format!("{}://{}/", url.scheme(), netloc);
    let rest = raw
        .strip_prefix(&origin)
        .map(str::to_string)
        .unwrap_or_else(|| url.path().trim_start_matches('/').to_string());
    Some(format!("/userfiles/{}/{}/{}", url.scheme(), netloc, rest))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| {
        tracing::error!("Cannot encode header value '{}': {}", value, e);
        ApiError::Internal
    })
}
