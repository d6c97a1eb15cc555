use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a job as written by the producers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Stopped,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Stopped,
    ];

    /// Completed and Stopped admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    /// Case-insensitive; producers are not consistent about casing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A job record as stored under `job:<job_id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub status: JobStatus,
    #[serde(default)]
    pub errors: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub output_json: Option<serde_json::Value>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Epoch timestamp relayed verbatim; the unit is up to the producer.
    #[serde(default)]
    pub updated_on: Option<i64>,
}

impl JobRecord {
    /// Placeholder used when a wait expires without ever seeing the record.
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            errors: None,
            url: None,
            output_json: None,
            content_type: None,
            file_name: None,
            updated_on: None,
        }
    }

    /// Decode and validate a stored blob.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// True when the record points at something a client can fetch.
    pub fn has_artifact(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty()) || self.output_json.is_some()
    }
}

/// Response body for `GET /job/{id}/status`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub worker_id: String,
    #[serde(flatten)]
    pub record: JobRecord,
}

/// Result of a long-poll, also the response body for `GET /job/{id}/wait`.
#[derive(Debug, Clone, Serialize)]
pub struct WaitResult {
    pub job_id: String,
    #[serde(flatten)]
    pub record: JobRecord,
    pub worker_id: String,
    pub polling_time: f64,
    pub polls_count: u32,
    /// Set when the deadline elapsed before a terminal status was seen.
    pub timed_out: bool,
}
