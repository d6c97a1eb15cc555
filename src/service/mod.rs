pub mod stats;

use std::time::Duration;

use tokio::time::Instant;

use crate::errors::JobError;
use crate::models::{JobRecord, WaitResult};
use crate::storage::JobRepository;

pub use stats::JobStats;

pub const MIN_MAX_WAIT_SECS: u64 = 10;
pub const MAX_MAX_WAIT_SECS: u64 = 3600;
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.5;
pub const MAX_POLL_INTERVAL_SECS: f64 = 60.0;

/// Logs at debug level when a wait is dropped before it finished, which is
/// how a client disconnect shows up.
struct WaitGuard<'a> {
    job_id: &'a str,
    finished: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Wait on job '{}' cancelled by client", self.job_id);
        }
    }
}

/// Read-only view of job lifecycles plus the long-poll loop.
#[derive(Clone)]
pub struct JobService {
    repo: JobRepository,
    worker_id: String,
}

impl JobService {
    pub fn new(repo: JobRepository, worker_id: impl Into<String>) -> Self {
        Self {
            repo,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Current record for `job_id`.
    pub async fn get(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.repo
            .read(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Poll `job_id` every `poll_interval` until it reaches a terminal status
    /// or `max_wait` elapses.
    ///
    /// A missing record on the first read is `NotFound`; later disappearances
    /// are treated as "not visible yet". Hitting the deadline is not an error:
    /// the result carries the last observed record (or `Pending`) with
    /// `timed_out` set. The final sleep is clamped to the remaining window and
    /// followed by one more read, so the call returns within
    /// `max_wait + poll_interval`.
    pub async fn wait(
        &self,
        job_id: &str,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<WaitResult, JobError> {
        let start = Instant::now();
        let deadline = start + max_wait;
        let mut polls_count: u32 = 0;
        let mut last_seen: Option<JobRecord> = None;
        let mut guard = WaitGuard {
            job_id,
            finished: false,
        };

        tracing::debug!(
            "Waiting on job '{}' (max_wait={:?}, poll_interval={:?})",
            job_id,
            max_wait,
            poll_interval
        );

        loop {
            polls_count += 1;

            match self.repo.read(job_id).await {
                Ok(Some(record)) if record.status.is_terminal() => {
                    guard.finished = true;
                    tracing::debug!(
                        "Job '{}' reached {} after {} poll(s)",
                        job_id,
                        record.status,
                        polls_count
                    );
                    return Ok(self.wait_result(job_id, record, start, polls_count, false));
                }
                Ok(Some(record)) => {
                    tracing::debug!("Job '{}' is {} (poll {})", job_id, record.status, polls_count);
                    last_seen = Some(record);
                }
                Ok(None) if polls_count == 1 => {
                    guard.finished = true;
                    return Err(JobError::NotFound(job_id.to_string()));
                }
                Ok(None) => {
                    tracing::debug!("Job '{}' not visible on poll {}", job_id, polls_count);
                }
                Err(e) => {
                    guard.finished = true;
                    return Err(e.into());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                guard.finished = true;
                tracing::debug!(
                    "Wait on job '{}' hit its {:?} deadline after {} poll(s)",
                    job_id,
                    max_wait,
                    polls_count
                );
                let record = last_seen.unwrap_or_else(JobRecord::pending);
                return Ok(self.wait_result(job_id, record, start, polls_count, true));
            }

            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// Histogram of stored jobs by status.
    pub async fn stats(&self) -> Result<JobStats, JobError> {
        stats::collect(&self.repo, &self.worker_id).await
    }

    fn wait_result(
        &self,
        job_id: &str,
        record: JobRecord,
        start: Instant,
        polls_count: u32,
        timed_out: bool,
    ) -> WaitResult {
        WaitResult {
            job_id: job_id.to_string(),
            record,
            worker_id: self.worker_id.clone(),
            polling_time: round_tenths(start.elapsed().as_secs_f64()),
            polls_count,
            timed_out,
        }
    }
}

fn round_tenths(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}
