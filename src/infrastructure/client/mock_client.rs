//! In-memory testing client for tests and offline use

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::domain::errors::{InsightError, InsightResult};
use crate::domain::fanout::{Fanout, Subscription};
use crate::domain::models::{
    CoverageUpdatePayload, FailureAnalysis, FlakyDetectionOptions, FlakyTest, RunOptions,
    TestEventPayload, TestResult,
};
use crate::domain::ports::{CoverageEventHandler, TestEventHandler, TestingClient};

/// Scriptable [`TestingClient`] that never leaves the process
///
/// - `list_tests` returns the configured catalogue
/// - `run_tests` pops the next scripted batch, or echoes the catalogue
/// - an injected failure is returned by every request until cleared
/// - an optional delay makes every request suspend first
/// - events are emitted by hand with the `emit_*` methods
pub struct MockTestingClient {
    catalogue: Mutex<Vec<TestResult>>,
    scripted_runs: Mutex<VecDeque<InsightResult<Vec<TestResult>>>>,
    failure: Mutex<Option<InsightError>>,
    delay: Mutex<Option<Duration>>,
    flaky: Mutex<Vec<FlakyTest>>,
    run_calls: AtomicUsize,
    started: Fanout<TestEventPayload>,
    completed: Fanout<TestEventPayload>,
    coverage: Fanout<CoverageUpdatePayload>,
}

impl MockTestingClient {
    pub fn new() -> Self {
        Self {
            catalogue: Mutex::new(Vec::new()),
            scripted_runs: Mutex::new(VecDeque::new()),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            flaky: Mutex::new(Vec::new()),
            run_calls: AtomicUsize::new(0),
            started: Fanout::new(),
            completed: Fanout::new(),
            coverage: Fanout::new(),
        }
    }

    pub fn with_tests(tests: Vec<TestResult>) -> Self {
        let client = Self::new();
        *lock(&client.catalogue) = tests;
        client
    }

    /// Queue the outcome of the next `run_tests` call.
    pub fn push_run(&self, outcome: InsightResult<Vec<TestResult>>) {
        lock(&self.scripted_runs).push_back(outcome);
    }

    pub fn fail_with(&self, error: InsightError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    pub fn set_flaky_tests(&self, flaky: Vec<FlakyTest>) {
        *lock(&self.flaky) = flaky;
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn emit_started(&self, payload: &TestEventPayload) -> usize {
        self.started.emit(payload)
    }

    pub fn emit_completed(&self, payload: &TestEventPayload) -> usize {
        self.completed.emit(payload)
    }

    pub fn emit_coverage(&self, payload: &CoverageUpdatePayload) -> usize {
        self.coverage.emit(payload)
    }

    async fn enter(&self) -> InsightResult<()> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.failure).clone().map_or(Ok(()), Err)
    }
}

impl Default for MockTestingClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TestingClient for MockTestingClient {
    async fn list_tests(&self) -> InsightResult<Vec<TestResult>> {
        self.enter().await?;
        Ok(lock(&self.catalogue).clone())
    }

    async fn run_tests(&self, options: RunOptions) -> InsightResult<Vec<TestResult>> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let scripted = lock(&self.scripted_runs).pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                let catalogue = lock(&self.catalogue).clone();
                Ok(match options.test_path {
                    Some(path) => catalogue.into_iter().filter(|t| t.file == path).collect(),
                    None => catalogue,
                })
            }
        }
    }

    async fn detect_flaky_tests(
        &self,
        _options: FlakyDetectionOptions,
    ) -> InsightResult<Vec<FlakyTest>> {
        self.enter().await?;
        Ok(lock(&self.flaky).clone())
    }

    async fn analyze_failure(&self, test_id: &str) -> InsightResult<FailureAnalysis> {
        self.enter().await?;
        Ok(FailureAnalysis {
            test_id: test_id.to_string(),
            summary: format!("Mock analysis for {test_id}"),
            root_cause: None,
            suggestions: vec!["Re-run the test in isolation".to_string()],
            confidence: 0.5,
        })
    }

    fn on_test_started(&self, handler: TestEventHandler) -> Subscription {
        self.started.subscribe("test-started", handler)
    }

    fn on_test_completed(&self, handler: TestEventHandler) -> Subscription {
        self.completed.subscribe("test-completed", handler)
    }

    fn on_coverage_updated(&self, handler: CoverageEventHandler) -> Subscription {
        self.coverage.subscribe("coverage-updated", handler)
    }
}
