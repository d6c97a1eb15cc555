//! CLI integration tests using assert_cmd.
//!
//! These tests invoke the actual `job-polling` binary and verify its output.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn server_cmd() -> Command {
    Command::cargo_bin("job-polling").expect("binary should exist")
}

#[test]
fn test_version_flag() {
    server_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    server_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Job Polling API"))
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_malformed_config_fails_fast() {
    server_cmd()
        .env("REDIS_PORT", "not-a-port")
        .assert()
        .failure()
        .stderr(predicate::str::contains("REDIS_PORT"));
}

#[test]
fn test_unreachable_backend_is_fatal() {
    server_cmd()
        .env("REDIS_HOST", "127.0.0.1")
        .env("REDIS_PORT", "1")
        .env("REDIS_TIMEOUT_MS", "500")
        .env("PORT", "0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not reachable"));
}

#[test]
fn test_unknown_log_level_fails_fast() {
    server_cmd()
        .env("LOG_LEVEL", "LOUD")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LOG_LEVEL"));
}
