//! Logging setup and the optional error-reporting sink.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::models::Settings;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `--verbose` or `DEBUG=true` select
/// `debug`, falling back to `LOG_LEVEL`.
pub fn init_tracing(settings: &Settings, verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(settings, verbose));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn effective_level(settings: &Settings, verbose: bool) -> LevelFilter {
    if verbose || (settings.debug && settings.log_level == LevelFilter::INFO) {
        LevelFilter::DEBUG
    } else {
        settings.log_level
    }
}

fn default_filter(settings: &Settings, verbose: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(effective_level(settings, verbose).into())
        .parse_lossy("")
}

/// Where reported errors are shipped, resolved from a Sentry-style DSN
/// `<scheme>://<public_key>@<host>[:port][/prefix]/<project_id>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentryTarget {
    pub store_url: String,
    pub public_key: String,
}

impl SentryTarget {
    pub fn parse(dsn: &str) -> Result<Self> {
        let url = reqwest::Url::parse(dsn).with_context(|| format!("Invalid DSN '{}'", dsn))?;
        let public_key = url.username();
        if public_key.is_empty() {
            return Err(anyhow!("DSN is missing its public key"));
        }
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("DSN is missing a host"))?;

        let path = url.path().trim_end_matches('/');
        let (prefix, project_id) = path
            .rsplit_once('/')
            .filter(|(_, id)| !id.is_empty())
            .ok_or_else(|| anyhow!("DSN is missing a project id"))?;

        let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        Ok(Self {
            store_url: format!(
                "{}://{}{}{}/api/{}/store/",
                url.scheme(),
                host,
                port,
                prefix,
                project_id
            ),
            public_key: public_key.to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!(
            "Sentry sentry_version=7, sentry_client=job-polling/{}, sentry_key={}",
            env!("CARGO_PKG_VERSION"),
            self.public_key
        )
    }
}

/// Forwards error events to an external collector. Disabled when no DSN is
/// configured, in which case reports are dropped (they are logged anyway).
#[derive(Clone)]
pub struct ErrorReporter {
    target: Option<Arc<SentryTarget>>,
    client: reqwest::Client,
    server_name: String,
    release: String,
}

impl ErrorReporter {
    pub fn disabled() -> Self {
        Self {
            target: None,
            client: reqwest::Client::new(),
            server_name: String::new(),
            release: String::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let target = if settings.sentry_dsn.is_empty() {
            None
        } else {
            Some(Arc::new(
                SentryTarget::parse(&settings.sentry_dsn).context("Invalid SENTRY_DSN")?,
            ))
        };
        Ok(Self {
            target,
            client: reqwest::Client::new(),
            server_name: settings.worker_id.clone(),
            release: settings.version.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Fire-and-forget; never blocks the caller and never fails it.
    pub fn report(&self, level: &'static str, message: impl Into<String>) {
        let Some(target) = self.target.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let event = self.event(level, message.into());
        let client = self.client.clone();
        runtime.spawn(async move {
            let result = client
                .post(&target.store_url)
                .header("X-Sentry-Auth", target.auth_header())
                .json(&event)
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!("Error telemetry rejected event: HTTP {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to send error telemetry: {}", e),
            }
        });
    }

    fn event(&self, level: &str, message: String) -> serde_json::Value {
        serde_json::json!({
            "event_id": Uuid::now_v7().simple().to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "logger": "job-polling",
            "platform": "other",
            "server_name": self.server_name,
            "release": self.release,
            "message": message,
        })
    }
}
