use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::errors::ApiError;
use super::AppState;
use crate::service::JobStats;

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub project_name: String,
    pub version: String,
    pub worker_id: String,
    pub debug: bool,
}

/// GET /admin/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<JobStats>, ApiError> {
    let stats = state
        .service
        .stats()
        .await
        .map_err(|e| state.job_error(e))?;
    Ok(Json(stats))
}

/// GET /admin/info
pub async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let settings = &state.settings;
    Json(InfoResponse {
        project_name: settings.project_name.clone(),
        version: settings.version.clone(),
        worker_id: settings.worker_id.clone(),
        debug: settings.debug,
    })
}
