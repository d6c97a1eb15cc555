use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{KvStore, StorageResult};
use crate::errors::StorageError;

/// In-process [`KvStore`], used by the test suites to stand in for Redis.
/// Writes go through the inherent methods; the trait stays read-only.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Connection("connection refused".to_string()))
        }
    }
}

/// Glob match supporting only a trailing `*`, which is all the service uses.
fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check()?;
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Command(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        self.check()?;
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Command(e.to_string()))?;
        Ok(entries
            .keys()
            .filter(|k| matches_pattern(pattern, k))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.check()
    }
}
