pub mod admin;
pub mod errors;
pub mod health;
pub mod jobs;

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::JobError;
use crate::models::Settings;
use crate::service::JobService;
use crate::storage::KvStore;
use crate::telemetry::ErrorReporter;
use errors::ApiError;

/// Shared application state for the Axum server.
pub struct AppState {
    pub service: JobService,
    pub kv: Arc<dyn KvStore>,
    pub settings: Arc<Settings>,
    pub reporter: ErrorReporter,
}

impl AppState {
    /// Translate a domain error at the HTTP boundary. Backend failures are
    /// logged and forwarded to error telemetry.
    pub fn job_error(&self, err: JobError) -> ApiError {
        match err {
            JobError::NotFound(job_id) => {
                tracing::debug!("Job not found: '{}'", job_id);
                ApiError::NotFound { job_id }
            }
            JobError::Backend(e) => {
                tracing::warn!("Backend unavailable: {}", e);
                self.reporter.report("error", format!("Backend unavailable: {}", e));
                if self.settings.debug_full_response {
                    ApiError::Backend(e.to_string())
                } else {
                    ApiError::Backend("backend unavailable".to_string())
                }
            }
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let on_panic = PanicResponder {
        reporter: state.reporter.clone(),
    };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/", get(health::health_check))
        .route("/health/ping", get(health::ping))
        .route("/job/{id}/status", get(jobs::job_status))
        .route("/job/{id}/wait", get(jobs::wait_for_job))
        .route("/job/{id}/download", get(jobs::download_job))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/info", get(admin::info))
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            enforce_allowed_hosts,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(CatchPanicLayer::custom(on_panic))
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

/// Reject requests whose Host is not in `ALLOWED_HOSTS` (unless it has `*`).
async fn enforce_allowed_hosts(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let hosts = &state.settings.allowed_hosts;
    if hosts.iter().any(|h| h == "*") {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string));
    let allowed = host
        .as_deref()
        .map(strip_port)
        .is_some_and(|h| state.settings.is_host_allowed(h));

    if allowed {
        next.run(request).await
    } else {
        tracing::warn!("Rejected request for disallowed host {:?}", host);
        ApiError::BadHost.into_response()
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [::1]:8001
        return host.split(']').next().map_or(host, |h| &h[1..]);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Global fallback for handler panics: log, report, answer 500.
#[derive(Clone)]
struct PanicResponder {
    reporter: ErrorReporter,
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response {
        let message = panic_message(&*err);
        tracing::error!("Request handler panicked: {}", message);
        self.reporter
            .report("fatal", format!("Request handler panicked: {}", message));
        ApiError::Internal.into_response()
    }
}

fn panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}
