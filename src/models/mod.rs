pub mod config;
pub mod job;

pub use config::Settings;
pub use job::{JobRecord, JobStatus, JobStatusResponse, WaitResult};
