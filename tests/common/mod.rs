//! Common test utilities for integration tests
//!
//! Shared fixtures used across multiple integration test files.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use testlens::domain::models::{TestError, TestResult, TestStatus};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Fixed base time so history timestamps are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn minutes_after_base(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

/// A located result in `file` with the given status.
pub fn result(id: &str, file: &str, line: u32, status: TestStatus) -> TestResult {
    let mut result = TestResult::new(id, format!("test {id}"), status)
        .with_location(file, line)
        .with_suite(["root", file])
        .with_duration(10);
    if status == TestStatus::Failed {
        result = result.with_error(TestError::new(format!("{id} failed")));
    }
    result
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    predicate()
}
