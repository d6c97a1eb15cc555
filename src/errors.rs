use std::time::Duration;

use thiserror::Error;

/// Failures talking to the key-value backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("KV connection error: {0}")]
    Connection(String),

    #[error("KV command error: {0}")]
    Command(String),

    #[error("KV command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed record at '{key}': {reason}")]
    Decode { key: String, reason: String },
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StorageError::Connection(err.to_string())
        } else {
            StorageError::Command(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StorageError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StorageError::Connection(err.to_string())
    }
}

/// Domain errors raised by the job service.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Backend(#[from] StorageError),
}
