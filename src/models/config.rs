use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Serialize, Serializer};
use tracing::level_filters::LevelFilter;

/// Process-wide settings, read once from the environment at startup.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub project_name: String,
    pub version: String,
    pub debug: bool,
    pub debug_full_response: bool,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    #[serde(skip_serializing)]
    pub redis_password: String,
    pub redis_timeout_ms: u64,
    pub redis_pool_size: usize,
    pub allowed_hosts: Vec<String>,
    pub worker_id: String,
    #[serde(serialize_with = "serialize_level")]
    pub log_level: LevelFilter,
    #[serde(skip_serializing)]
    pub sentry_dsn: String,
}

fn default_worker_id() -> String {
    format!("worker-{}", std::process::id())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "Job Polling API".to_string(),
            version: "1.0.0".to_string(),
            debug: false,
            debug_full_response: false,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: String::new(),
            redis_timeout_ms: 5000,
            redis_pool_size: 16,
            allowed_hosts: vec!["*".to_string()],
            worker_id: default_worker_id(),
            log_level: LevelFilter::INFO,
            sentry_dsn: String::new(),
        }
    }
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Unset or empty
    /// variables keep their defaults, except `REDIS_PASSWORD` and
    /// `SENTRY_DSN` where empty is meaningful.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(v) = get("PROJECT_NAME") {
            settings.project_name = v;
        }
        if let Some(v) = get("VERSION") {
            settings.version = v;
        }
        if let Some(v) = get("DEBUG") {
            settings.debug = parse_bool(&v).context("Invalid DEBUG")?;
        }
        if let Some(v) = get("DEBUG_FULL_RESPONSE") {
            settings.debug_full_response =
                parse_bool(&v).context("Invalid DEBUG_FULL_RESPONSE")?;
        }
        if let Some(v) = lookup("REDIS_HOST") {
            if v.trim().is_empty() {
                bail!("REDIS_HOST must not be empty");
            }
            settings.redis_host = v.trim().to_string();
        }
        if let Some(v) = get("REDIS_PORT") {
            settings.redis_port = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid REDIS_PORT '{}'", v))?;
        }
        if let Some(v) = get("REDIS_DB") {
            settings.redis_db = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid REDIS_DB '{}'", v))?;
            if settings.redis_db < 0 {
                bail!("REDIS_DB must be non-negative, got {}", settings.redis_db);
            }
        }
        if let Some(v) = lookup("REDIS_PASSWORD") {
            settings.redis_password = v;
        }
        if let Some(v) = get("REDIS_TIMEOUT_MS") {
            settings.redis_timeout_ms = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid REDIS_TIMEOUT_MS '{}'", v))?;
        }
        if let Some(v) = get("REDIS_POOL_SIZE") {
            settings.redis_pool_size = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid REDIS_POOL_SIZE '{}'", v))?;
            if settings.redis_pool_size == 0 {
                bail!("REDIS_POOL_SIZE must be at least 1");
            }
        }
        if let Some(v) = get("ALLOWED_HOSTS") {
            settings.allowed_hosts = parse_list(&v).context("Invalid ALLOWED_HOSTS")?;
        }
        if let Some(v) = get("WORKER_ID") {
            settings.worker_id = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            settings.log_level = parse_log_level(&v)?;
        }
        if let Some(v) = lookup("SENTRY_DSN") {
            settings.sentry_dsn = v.trim().to_string();
        }

        Ok(settings)
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    /// Whether `host` (without port) passes the allow-list.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(host))
    }
}

/// Accepts tracing level names plus the aliases `WARNING`, `CRITICAL` and
/// `FATAL`, case-insensitively.
fn parse_log_level(raw: &str) -> Result<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" | "fatal" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => bail!("Invalid LOG_LEVEL '{}'", raw.trim()),
    }
}

fn serialize_level<S>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&level.to_string())
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{}'", other)),
    }
}

/// Accepts either a JSON array of strings or a comma-separated list.
fn parse_list(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    let items: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("expected a JSON array of strings")?
    } else {
        trimmed.split(',').map(|s| s.to_string()).collect()
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
