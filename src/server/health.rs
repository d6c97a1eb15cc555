use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub worker_id: String,
    pub redis_connected: bool,
    pub timestamp: DateTime<Utc>,
}

/// GET /health/ -- always 200; backend health is reported in the body.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let redis_connected = match state.kv.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check ping failed: {}", e);
            false
        }
    };

    Json(HealthResponse {
        status: if redis_connected { "healthy" } else { "unhealthy" }.to_string(),
        worker_id: state.settings.worker_id.clone(),
        redis_connected,
        timestamp: Utc::now(),
    })
}

/// GET /health/ping
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}
