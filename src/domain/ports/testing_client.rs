//! Port to the external testing-analysis server.

use async_trait::async_trait;

use crate::domain::errors::{ConsumerError, InsightResult};
use crate::domain::fanout::Subscription;
use crate::domain::models::{
    CoverageUpdatePayload, FailureAnalysis, FlakyDetectionOptions, FlakyTest, RunOptions,
    TestEventPayload, TestResult,
};

/// Callback for raw test lifecycle payloads.
pub type TestEventHandler =
    Box<dyn Fn(&TestEventPayload) -> Result<(), ConsumerError> + Send + Sync>;

/// Callback for raw coverage payloads.
pub type CoverageEventHandler =
    Box<dyn Fn(&CoverageUpdatePayload) -> Result<(), ConsumerError> + Send + Sync>;

/// Port trait for the external testing-analysis server
///
/// The core never talks to the server transport directly; it only sees
/// this contract. Every async method is a suspension point: callers must
/// assume other operations may interleave while it is pending.
///
/// # Errors
/// - `InsightError::Connection` - server unreachable
/// - `InsightError::Timeout` - request exceeded the server-side deadline
#[async_trait]
pub trait TestingClient: Send + Sync {
    /// Discover all known tests with their last known status
    async fn list_tests(&self) -> InsightResult<Vec<TestResult>>;

    /// Execute tests and return the completed batch
    async fn run_tests(&self, options: RunOptions) -> InsightResult<Vec<TestResult>>;

    /// Server-side flaky detection over repeated executions
    async fn detect_flaky_tests(
        &self,
        options: FlakyDetectionOptions,
    ) -> InsightResult<Vec<FlakyTest>>;

    /// Server analysis of one failing test
    async fn analyze_failure(&self, test_id: &str) -> InsightResult<FailureAnalysis>;

    /// Register for `test started` events
    fn on_test_started(&self, handler: TestEventHandler) -> Subscription;

    /// Register for `test completed` events
    fn on_test_completed(&self, handler: TestEventHandler) -> Subscription;

    /// Register for `coverage updated` events
    fn on_coverage_updated(&self, handler: CoverageEventHandler) -> Subscription;
}
