#[doc(hidden)]
pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::StorageError;
use crate::models::JobRecord;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// The slice of a key-value backend the service relies on. Read-only by
/// contract: job records are authored by external producers.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Values for `keys`, positionally. Backends override this with a
    /// single batched round-trip.
    async fn get_many(&self, keys: &[String]) -> StorageResult<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }
    /// Every key matching a glob-style `pattern`.
    async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>>;
    async fn ping(&self) -> StorageResult<()>;
    async fn close(&self) {}
}

pub const JOB_KEY_PREFIX: &str = "job:";

pub fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_KEY_PREFIX, job_id)
}

/// Typed reads of job records on top of a [`KvStore`].
#[derive(Clone)]
pub struct JobRepository {
    kv: Arc<dyn KvStore>,
}

impl JobRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// `Ok(None)` means the key does not exist. A blob that fails to decode
    /// is a backend inconsistency and surfaces as [`StorageError::Decode`].
    pub async fn read(&self, job_id: &str) -> StorageResult<Option<JobRecord>> {
        let key = job_key(job_id);
        match self.kv.get(&key).await? {
            Some(raw) => decode_record(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn job_keys(&self) -> StorageResult<Vec<String>> {
        self.kv.scan_keys(&format!("{}*", JOB_KEY_PREFIX)).await
    }

    /// Batched read by full keys, used when enumerating. The outer error is
    /// a backend failure; entries are `None` for keys gone since the scan.
    pub async fn read_keys(
        &self,
        keys: &[String],
    ) -> StorageResult<Vec<Option<StorageResult<JobRecord>>>> {
        let values = self.kv.get_many(keys).await?;
        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, raw)| raw.map(|raw| decode_record(key, &raw)))
            .collect())
    }
}

fn decode_record(key: &str, raw: &str) -> StorageResult<JobRecord> {
    JobRecord::decode(raw).map_err(|e| StorageError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::models::JobStatus;

    fn repo_with(store: &Arc<MemoryStore>) -> JobRepository {
        JobRepository::new(Arc::clone(store) as Arc<dyn KvStore>)
    }

    #[test]
    fn test_job_key_format() {
        assert_eq!(job_key("abc"), "job:abc");
        assert_eq!(job_key("a:b"), "job:a:b");
    }

    #[tokio::test]
    async fn test_read_present_record() {
        let store = Arc::new(MemoryStore::new());
        store.insert("job:abc", r#"{"status":"completed","url":"https://x/y"}"#);
        let record = repo_with(&store).read("abc").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.url.as_deref(), Some("https://x/y"));
    }

    #[tokio::test]
    async fn test_read_missing_record_is_none() {
        let store = Arc::new(MemoryStore::new());
        assert!(repo_with(&store).read("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_malformed_record_is_decode_error() {
        let store = Arc::new(MemoryStore::new());
        store.insert("job:bad", r#"{"status":"Exploded"}"#);
        match repo_with(&store).read("bad").await {
            Err(StorageError::Decode { key, .. }) => assert_eq!(key, "job:bad"),
            other => panic!("Expected Decode error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_backend_failure_is_not_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.insert("job:abc", r#"{"status":"Running"}"#);
        store.set_available(false);
        assert!(matches!(
            repo_with(&store).read("abc").await,
            Err(StorageError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_job_keys_only_lists_job_prefix() {
        let store = Arc::new(MemoryStore::new());
        store.insert("job:1", r#"{"status":"Running"}"#);
        store.insert("job:2", r#"{"status":"Pending"}"#);
        store.insert("session:1", "{}");
        let mut keys = repo_with(&store).job_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["job:1", "job:2"]);
    }

    #[tokio::test]
    async fn test_read_keys_is_positional() {
        let store = Arc::new(MemoryStore::new());
        store.insert("job:1", r#"{"status":"Running"}"#);
        store.insert("job:3", "garbage");
        let keys: Vec<String> = ["job:1", "job:2", "job:3"]
            .iter()
            .map(|k| k.to_string())
            .collect();

        let reads = repo_with(&store).read_keys(&keys).await.unwrap();
        assert_eq!(reads.len(), 3);
        assert!(matches!(&reads[0], Some(Ok(r)) if r.status == JobStatus::Running));
        assert!(reads[1].is_none());
        assert!(matches!(&reads[2], Some(Err(StorageError::Decode { .. }))));
    }
}
