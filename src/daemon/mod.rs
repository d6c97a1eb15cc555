//! Application assembly: build shared state, probe the backend, serve until
//! a shutdown signal arrives, then release the KV pool.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::Settings;
use crate::server::{self, AppState};
use crate::service::JobService;
use crate::storage::redis::RedisStore;
use crate::storage::{JobRepository, KvStore};
use crate::telemetry::ErrorReporter;

/// Wire the service graph around an already-constructed KV store.
pub fn build_state(settings: Arc<Settings>, kv: Arc<dyn KvStore>) -> Result<Arc<AppState>> {
    let reporter = ErrorReporter::from_settings(&settings)?;
    if reporter.is_enabled() {
        tracing::info!("Error telemetry enabled");
    }
    let service = JobService::new(JobRepository::new(Arc::clone(&kv)), &settings.worker_id);
    Ok(Arc::new(AppState {
        service,
        kv,
        settings,
        reporter,
    }))
}

/// Ping the backend once; startup is aborted if it is unreachable.
pub async fn probe_backend(kv: &dyn KvStore, settings: &Settings) -> Result<()> {
    kv.ping().await.with_context(|| {
        format!(
            "Redis at {}:{} (db {}) is not reachable",
            settings.redis_host, settings.redis_port, settings.redis_db
        )
    })?;
    tracing::info!(
        "Connected to Redis at {}:{} (db {})",
        settings.redis_host,
        settings.redis_port,
        settings.redis_db
    );
    Ok(())
}

/// Start the HTTP server.
///
/// 1. Creates the Redis pool and pings it (fatal on failure)
/// 2. Builds AppState and the router
/// 3. Serves until Ctrl+C or SIGTERM
/// 4. Closes the pool
pub async fn start_daemon(settings: Settings, host: &str, port: u16) -> Result<()> {
    let settings = Arc::new(settings);
    tracing::info!(
        "Starting {} {} as {}",
        settings.project_name,
        settings.version,
        settings.worker_id
    );
    tracing::debug!(
        "Settings: {}",
        serde_json::to_string(settings.as_ref()).unwrap_or_default()
    );

    let kv: Arc<dyn KvStore> = Arc::new(RedisStore::new(&settings)?);
    probe_backend(kv.as_ref(), &settings).await?;

    let state = build_state(Arc::clone(&settings), Arc::clone(&kv))?;
    let router = server::create_router(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context(format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down application");
    kv.close().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received Ctrl+C signal");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM signal");
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received Ctrl+C signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C signal");
    }
}
