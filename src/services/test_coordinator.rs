//! Operations that call out to the testing server.
//!
//! Each client call is a suspension point and is bounded by the configured
//! timeout. Store mutation happens only after the awaited call has
//! resolved, in one synchronous step, so a failed or cancelled call never
//! leaves a partial write behind.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{InsightError, InsightResult};
use crate::domain::models::{
    Config, FailureAnalysis, FlakyDetectionOptions, FlakyTest, RunOptions, TestRunHistory,
};
use crate::domain::ports::TestingClient;
use crate::services::flaky_analyzer::FlakyAnalyzer;
use crate::services::result_store::ResultStore;

/// Allowed range for flaky detection iterations.
pub const DETECTION_ITERATIONS: std::ops::RangeInclusive<u32> = 2..=100;

/// Outcome of an on-demand flaky detection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyDetectionReport {
    pub requested_iterations: u32,
    pub completed_iterations: u32,
    pub cancelled: bool,
    pub flaky: Vec<FlakyTest>,
}

/// Coordinates client calls with the result store.
pub struct TestCoordinator {
    client: Arc<dyn TestingClient>,
    store: Arc<ResultStore>,
    analyzer: FlakyAnalyzer,
    timeout: Duration,
    detection_iterations: u32,
}

impl TestCoordinator {
    pub fn new(client: Arc<dyn TestingClient>, store: Arc<ResultStore>, config: &Config) -> Self {
        Self {
            client,
            store,
            analyzer: FlakyAnalyzer::new(&config.flaky),
            timeout: Duration::from_millis(config.client.timeout_ms),
            detection_iterations: config.flaky.detection_iterations,
        }
    }

    pub const fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    async fn call<T, F>(&self, operation: &str, request: F) -> InsightResult<T>
    where
        F: Future<Output = InsightResult<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(operation, error = %err, "testing client call failed");
                Err(err)
            }
            Err(_) => {
                let err = InsightError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                };
                tracing::warn!(operation, error = %err, "testing client call timed out");
                Err(err)
            }
        }
    }

    async fn call_cancellable<T, F>(
        &self,
        operation: &str,
        request: F,
        cancel: &CancellationToken,
    ) -> InsightResult<T>
    where
        F: Future<Output = InsightResult<T>>,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(operation, "operation cancelled");
                Err(InsightError::Cancelled(operation.to_string()))
            }
            outcome = self.call(operation, request) => outcome,
        }
    }

    /// Discover tests and upsert each of them.
    ///
    /// Safe to call again while a previous refresh is pending; the later
    /// response simply overwrites per id.
    pub async fn refresh(&self) -> InsightResult<usize> {
        let tests = self.call("list_tests", self.client.list_tests()).await?;
        let count = tests.len();
        for test in tests {
            self.store.upsert_result(test);
        }
        tracing::debug!(tests = count, "test list refreshed");
        Ok(count)
    }

    /// Run tests and record the batch as one history entry.
    ///
    /// Concurrent runs are allowed; each completed run is recorded
    /// atomically on its own. A cancelled or failed run records nothing.
    pub async fn run(
        &self,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> InsightResult<TestRunHistory> {
        let results = self
            .call_cancellable("run_tests", self.client.run_tests(options), cancel)
            .await?;
        Ok(self.store.record_run(results))
    }

    /// Run the suite `iterations` times, then analyze the retained history.
    ///
    /// Uses the configured iteration count when `iterations` is `None`.
    /// On cancellation, runs that completed stay recorded and the report is
    /// marked cancelled; the interrupted run leaves no history entry.
    pub async fn detect_flaky(
        &self,
        iterations: Option<u32>,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> InsightResult<FlakyDetectionReport> {
        let requested = validate_iterations(iterations.unwrap_or(self.detection_iterations))?;

        let mut completed = 0;
        while completed < requested && !cancel.is_cancelled() {
            match self.run(options.clone(), cancel).await {
                Ok(_) => completed += 1,
                Err(InsightError::Cancelled(_)) => break,
                Err(err) => return Err(err),
            }
        }

        let cancelled = completed < requested;
        tracing::info!(requested, completed, cancelled, "flaky detection finished");
        Ok(FlakyDetectionReport {
            requested_iterations: requested,
            completed_iterations: completed,
            cancelled,
            flaky: self.analyzer.analyze_store(&self.store),
        })
    }

    /// Flaky tests in the currently retained history.
    pub fn flaky_tests(&self) -> Vec<FlakyTest> {
        self.analyzer.analyze_store(&self.store)
    }

    /// Ask the server for its own flaky detection.
    pub async fn server_flaky_tests(&self, iterations: u32) -> InsightResult<Vec<FlakyTest>> {
        let iterations = validate_iterations(iterations)?;
        self.call(
            "detect_flaky_tests",
            self.client
                .detect_flaky_tests(FlakyDetectionOptions { iterations }),
        )
        .await
    }

    pub async fn analyze_failure(&self, test_id: &str) -> InsightResult<FailureAnalysis> {
        self.call("analyze_failure", self.client.analyze_failure(test_id))
            .await
    }
}

fn validate_iterations(iterations: u32) -> InsightResult<u32> {
    if DETECTION_ITERATIONS.contains(&iterations) {
        Ok(iterations)
    } else {
        Err(InsightError::InvalidArgument(format!(
            "iterations must be between {} and {}, got {iterations}",
            DETECTION_ITERATIONS.start(),
            DETECTION_ITERATIONS.end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_bounds() {
        assert!(validate_iterations(1).is_err());
        assert_eq!(validate_iterations(2).unwrap(), 2);
        assert_eq!(validate_iterations(100).unwrap(), 100);
        assert!(matches!(
            validate_iterations(101),
            Err(InsightError::InvalidArgument(_))
        ));
    }
}
