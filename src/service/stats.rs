use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{JobError, StorageError};
use crate::storage::JobRepository;

/// Response body for `GET /admin/stats`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobStats {
    pub total_jobs: usize,
    pub by_status: BTreeMap<String, usize>,
    pub worker_id: String,
}

/// Keys fetched per batched read.
const READ_BATCH: usize = 500;

/// Walk every `job:*` key and tally statuses. O(N) in stored jobs, one
/// batched read per [`READ_BATCH`] keys.
///
/// `total_jobs` counts keys; records that fail to decode or vanish between
/// the scan and the read are left out of `by_status`.
pub(super) async fn collect(repo: &JobRepository, worker_id: &str) -> Result<JobStats, JobError> {
    let keys = repo.job_keys().await?;
    let mut by_status = BTreeMap::new();

    for chunk in keys.chunks(READ_BATCH) {
        for read in repo.read_keys(chunk).await? {
            match read {
                Some(Ok(record)) => {
                    *by_status.entry(record.status.to_string()).or_insert(0) += 1;
                }
                None => {}
                Some(Err(StorageError::Decode { key, reason })) => {
                    tracing::debug!("Skipping undecodable record '{}': {}", key, reason);
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    Ok(JobStats {
        total_jobs: keys.len(),
        by_status,
        worker_id: worker_id.to_string(),
    })
}
