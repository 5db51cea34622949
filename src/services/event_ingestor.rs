//! Ingestion of asynchronous server events into the store and aggregator.
//!
//! Payloads are validated before anything is applied. A malformed event is
//! dropped and logged and leaves all state unchanged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::errors::InsightResult;
use crate::domain::fanout::Subscription;
use crate::domain::models::{ClientEvent, CoverageUpdatePayload, TestEventPayload, TestResult};
use crate::domain::ports::TestingClient;
use crate::services::coverage_aggregator::CoverageAggregator;
use crate::services::result_store::ResultStore;

struct IngestorInner {
    store: Arc<ResultStore>,
    coverage: Arc<CoverageAggregator>,
    applied: AtomicU64,
    dropped: AtomicU64,
}

impl IngestorInner {
    fn started(&self, payload: TestEventPayload) -> InsightResult<()> {
        let result = self.validate("test_started", payload.into_started())?;
        self.store.upsert_result(result);
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn completed(&self, payload: TestEventPayload) -> InsightResult<()> {
        let result = self.validate("test_completed", payload.into_completed())?;
        self.store.upsert_result(result);
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn coverage_updated(&self, payload: CoverageUpdatePayload) {
        self.coverage.apply_update(payload);
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    fn run_completed(&self, tests: Vec<TestEventPayload>) -> InsightResult<()> {
        let results = tests
            .into_iter()
            .map(TestEventPayload::into_completed)
            .collect::<InsightResult<Vec<TestResult>>>();
        let results = self.validate("run_completed", results)?;
        self.store.record_run(results);
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn validate<T>(&self, kind: &str, outcome: InsightResult<T>) -> InsightResult<T> {
        outcome.inspect_err(|err| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(event = kind, error = %err, "dropping malformed event");
        })
    }
}

/// Routes server events into the [`ResultStore`] and [`CoverageAggregator`].
#[derive(Clone)]
pub struct EventIngestor {
    inner: Arc<IngestorInner>,
}

impl EventIngestor {
    pub fn new(store: Arc<ResultStore>, coverage: Arc<CoverageAggregator>) -> Self {
        Self {
            inner: Arc::new(IngestorInner {
                store,
                coverage,
                applied: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Apply one decoded event.
    ///
    /// Returns `InsightError::MalformedEvent` when the event was dropped.
    pub fn handle(&self, event: ClientEvent) -> InsightResult<()> {
        match event {
            ClientEvent::TestStarted(payload) => self.inner.started(payload),
            ClientEvent::TestCompleted(payload) => self.inner.completed(payload),
            ClientEvent::CoverageUpdated(payload) => {
                self.inner.coverage_updated(payload);
                Ok(())
            }
            ClientEvent::RunCompleted { tests } => self.inner.run_completed(tests),
        }
    }

    /// Subscribe to the client's three event streams.
    ///
    /// Ingestion continues until the returned handle is detached or dropped.
    pub fn attach(&self, client: &dyn TestingClient) -> IngestionHandle {
        let started = Arc::clone(&self.inner);
        let completed = Arc::clone(&self.inner);
        let coverage = Arc::clone(&self.inner);

        // malformed payloads are handled here, not reported as consumer errors
        let subscriptions = vec![
            client.on_test_started(Box::new(move |payload: &TestEventPayload| {
                let _ = started.started(payload.clone());
                Ok(())
            })),
            client.on_test_completed(Box::new(move |payload: &TestEventPayload| {
                let _ = completed.completed(payload.clone());
                Ok(())
            })),
            client.on_coverage_updated(Box::new(move |payload: &CoverageUpdatePayload| {
                coverage.coverage_updated(payload.clone());
                Ok(())
            })),
        ];

        tracing::info!("event ingestion attached");
        IngestionHandle { subscriptions }
    }

    /// Events applied so far.
    pub fn applied_events(&self) -> u64 {
        self.inner.applied.load(Ordering::Relaxed)
    }

    /// Malformed events dropped so far.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.inner.store
    }

    pub fn coverage(&self) -> &Arc<CoverageAggregator> {
        &self.inner.coverage
    }
}

/// Live subscriptions of an attached [`EventIngestor`].
#[derive(Debug)]
pub struct IngestionHandle {
    subscriptions: Vec<Subscription>,
}

impl IngestionHandle {
    pub fn is_attached(&self) -> bool {
        self.subscriptions.iter().any(Subscription::is_active)
    }

    /// Stop ingestion. No event is applied after this returns.
    pub fn detach(self) {
        for subscription in self.subscriptions {
            subscription.dispose();
        }
        tracing::info!("event ingestion detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::InsightError;
    use crate::domain::models::{CoverageMetric, CoverageSnapshot, CoverageSummary, TestStatus};
    use std::collections::HashMap;

    fn ingestor() -> EventIngestor {
        EventIngestor::new(
            Arc::new(ResultStore::new()),
            Arc::new(CoverageAggregator::default()),
        )
    }

    fn payload(id: Option<&str>, status: Option<TestStatus>) -> TestEventPayload {
        TestEventPayload {
            id: id.map(str::to_string),
            status,
            file: Some("a.ts".to_string()),
            line: Some(3),
            ..TestEventPayload::default()
        }
    }

    #[test]
    fn test_started_then_completed() {
        let ingestor = ingestor();
        ingestor
            .handle(ClientEvent::TestStarted(payload(Some("t1"), None)))
            .unwrap();
        assert_eq!(
            ingestor.store().get_by_id("t1").unwrap().status,
            TestStatus::Running
        );

        ingestor
            .handle(ClientEvent::TestCompleted(payload(Some("t1"), Some(TestStatus::Passed))))
            .unwrap();
        assert_eq!(
            ingestor.store().get_by_id("t1").unwrap().status,
            TestStatus::Passed
        );
        assert_eq!(ingestor.store().list_by_file("a.ts").len(), 1);
        assert_eq!(ingestor.applied_events(), 2);
    }

    #[test]
    fn test_malformed_event_dropped() {
        let ingestor = ingestor();
        let outcome =
            ingestor.handle(ClientEvent::TestCompleted(payload(None, Some(TestStatus::Failed))));

        assert!(matches!(outcome, Err(InsightError::MalformedEvent(_))));
        assert_eq!(ingestor.store().result_count(), 0);
        assert_eq!(ingestor.dropped_events(), 1);
    }

    #[test]
    fn test_run_with_malformed_member_is_not_partially_applied() {
        let ingestor = ingestor();
        let outcome = ingestor.handle(ClientEvent::RunCompleted {
            tests: vec![
                payload(Some("ok"), Some(TestStatus::Passed)),
                payload(Some("no-status"), None),
            ],
        });

        assert!(outcome.is_err());
        assert_eq!(ingestor.store().result_count(), 0);
        assert_eq!(ingestor.store().history_len(), 0);
    }

    #[test]
    fn test_run_completed_records_history() {
        let ingestor = ingestor();
        ingestor
            .handle(ClientEvent::RunCompleted {
                tests: vec![
                    payload(Some("a"), Some(TestStatus::Passed)),
                    payload(Some("b"), Some(TestStatus::Failed)),
                ],
            })
            .unwrap();

        let history = ingestor.store().export_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].failed, 1);
    }

    #[test]
    fn test_coverage_event() {
        let ingestor = ingestor();
        let mut files = HashMap::new();
        files.insert(
            "a.ts".to_string(),
            CoverageSnapshot::from_summary(CoverageSummary {
                lines: CoverageMetric::new(4, 3),
                ..CoverageSummary::default()
            }),
        );
        ingestor
            .handle(ClientEvent::CoverageUpdated(CoverageUpdatePayload { files }))
            .unwrap();
        assert!((ingestor.coverage().get_summary().lines - 75.0).abs() < 1e-9);
    }
}
