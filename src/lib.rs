pub mod cli;
pub mod daemon;
pub mod errors;
pub mod models;
pub mod server;
pub mod service;
pub mod storage;
pub mod telemetry;
