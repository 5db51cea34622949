//! Client-facing operations against the in-memory testing client.

mod common;

use common::result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testlens::domain::models::{ChangeKind, RunOptions, StoreChange, TestStatus};
use testlens::{Config, InsightError, MockTestingClient, ResultStore, TestCoordinator};
use tokio_util::sync::CancellationToken;

fn config_with_timeout(timeout_ms: u64) -> Config {
    let mut config = Config::default();
    config.client.timeout_ms = timeout_ms;
    config
}

fn setup(timeout_ms: u64) -> (Arc<MockTestingClient>, Arc<ResultStore>, TestCoordinator) {
    common::setup_test_logging();
    let client = Arc::new(MockTestingClient::with_tests(vec![
        result("a", "math.test.ts", 1, TestStatus::Passed),
        result("b", "math.test.ts", 7, TestStatus::Passed),
    ]));
    let store = Arc::new(ResultStore::new());
    let coordinator = TestCoordinator::new(
        client.clone(),
        Arc::clone(&store),
        &config_with_timeout(timeout_ms),
    );
    (client, store, coordinator)
}

#[tokio::test]
async fn test_refresh_upserts_discovered_tests() {
    let (_client, store, coordinator) = setup(1_000);
    assert_eq!(coordinator.refresh().await.unwrap(), 2);
    assert_eq!(store.list_by_file("math.test.ts").len(), 2);
    assert_eq!(store.history_len(), 0);
}

#[tokio::test]
async fn test_run_records_one_history_entry() {
    let (client, store, coordinator) = setup(1_000);
    client.push_run(Ok(vec![
        result("a", "math.test.ts", 1, TestStatus::Passed),
        result("b", "math.test.ts", 7, TestStatus::Failed),
    ]));

    let run = coordinator
        .run(RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((run.passed, run.failed), (1, 1));
    assert_eq!(store.export_history(), vec![run]);
    assert_eq!(store.get_by_id("b").unwrap().status, TestStatus::Failed);
}

#[tokio::test]
async fn test_timeout_leaves_store_unchanged() {
    let (client, store, coordinator) = setup(30);
    client.set_delay(Some(Duration::from_millis(500)));

    let err = coordinator
        .run(RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, InsightError::Timeout { timeout_ms: 30, .. }));
    assert!(err.is_transport());
    assert_eq!(store.history_len(), 0);
    assert_eq!(store.result_count(), 0);
}

#[tokio::test]
async fn test_connection_error_propagates_without_retry() {
    let (client, store, coordinator) = setup(1_000);
    client.fail_with(InsightError::Connection("server not running".into()));

    let err = coordinator
        .run(RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, InsightError::Connection(_)));
    assert_eq!(client.run_calls(), 1);
    assert_eq!(store.history_len(), 0);

    assert!(coordinator.refresh().await.is_err());
    assert_eq!(store.result_count(), 0);
}

#[tokio::test]
async fn test_cancelled_run_records_nothing() {
    let (client, store, coordinator) = setup(5_000);
    client.set_delay(Some(Duration::from_millis(500)));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = coordinator
        .run(RunOptions::default(), &token)
        .await
        .unwrap_err();

    assert!(matches!(err, InsightError::Cancelled(_)));
    assert_eq!(store.history_len(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_each_recorded() {
    let (_client, store, coordinator) = setup(1_000);
    let token = CancellationToken::new();

    let (first, second) = tokio::join!(
        coordinator.run(RunOptions::for_path("math.test.ts"), &token),
        coordinator.run(RunOptions::default(), &token),
    );

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.id, second.id);
    assert_eq!(store.history_len(), 2);
    assert!(store.export_history().iter().all(|h| h.is_consistent()));
}

#[tokio::test]
async fn test_detect_flaky_runs_requested_iterations() {
    let (client, _store, coordinator) = setup(1_000);
    for i in 0..4 {
        let status = if i % 2 == 0 { TestStatus::Passed } else { TestStatus::Failed };
        client.push_run(Ok(vec![
            result("a", "math.test.ts", 1, status),
            result("b", "math.test.ts", 7, TestStatus::Passed),
        ]));
    }

    let report = coordinator
        .detect_flaky(Some(4), RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.completed_iterations, 4);
    assert!(!report.cancelled);
    assert_eq!(report.flaky.len(), 1);
    assert_eq!(report.flaky[0].test_id, "a");
    assert_eq!(report.flaky[0].failures, 2);
    assert_eq!(coordinator.flaky_tests(), report.flaky);
}

#[tokio::test]
async fn test_detect_flaky_rejects_out_of_range_iterations() {
    let (client, _store, coordinator) = setup(1_000);
    for iterations in [1, 101] {
        let err = coordinator
            .detect_flaky(Some(iterations), RunOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::InvalidArgument(_)));
    }
    assert_eq!(client.run_calls(), 0);
}

#[tokio::test]
async fn test_detect_flaky_cancelled_between_runs_keeps_completed() {
    let (client, store, coordinator) = setup(1_000);
    let token = CancellationToken::new();

    let recorded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&recorded);
    let canceller = token.clone();
    let _sub = store.subscribe("stop-after-two", move |change: &StoreChange| {
        if change.kind == ChangeKind::History && counter.fetch_add(1, Ordering::SeqCst) == 1 {
            canceller.cancel();
        }
        Ok(())
    });

    let report = coordinator
        .detect_flaky(Some(10), RunOptions::default(), &token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.completed_iterations, 2);
    assert_eq!(store.history_len(), 2);
    assert_eq!(client.run_calls(), 2);
}

#[tokio::test]
async fn test_server_side_operations() {
    let (_client, _store, coordinator) = setup(1_000);

    assert!(coordinator.server_flaky_tests(10).await.unwrap().is_empty());
    assert!(coordinator.server_flaky_tests(0).await.is_err());

    let analysis = coordinator.analyze_failure("b").await.unwrap();
    assert_eq!(analysis.test_id, "b");
}
