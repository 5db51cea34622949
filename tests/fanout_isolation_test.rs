//! Notification delivery must be isolated per consumer.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use testlens::domain::errors::ConsumerError;
use testlens::domain::models::{ChangeKind, StoreChange, TestStatus};
use testlens::ResultStore;

fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(&StoreChange) -> Result<(), ConsumerError> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_failing_consumer_does_not_block_others() {
    common::setup_test_logging();
    let store = ResultStore::new();
    let first = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));

    let _a = store.subscribe("first", counting(&first));
    let _b = store.subscribe("second", |_: &StoreChange| Err(ConsumerError::new("view gone")));
    let _c = store.subscribe("third", counting(&third));

    store.upsert_result(common::result("t1", "a.test.ts", 1, TestStatus::Passed));

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 1);
    assert_eq!(store.changes().consumer_failures(), 1);
    assert!(store.get_by_id("t1").is_some(), "mutation stands");
}

#[test]
fn test_panicking_consumer_is_contained() {
    let store = ResultStore::new();
    let survivor = Arc::new(AtomicUsize::new(0));

    let _p = store.subscribe("panics", |_: &StoreChange| -> Result<(), ConsumerError> {
        panic!("consumer bug")
    });
    let _s = store.subscribe("survivor", counting(&survivor));

    store.clear_history();
    store.clear_history();

    assert_eq!(survivor.load(Ordering::SeqCst), 2);
    assert_eq!(store.changes().consumer_failures(), 2);
}

#[test]
fn test_disposed_consumer_receives_nothing() {
    let store = ResultStore::new();
    let count = Arc::new(AtomicUsize::new(0));

    let sub = store.subscribe("view", counting(&count));
    store.clear_history();
    sub.dispose();
    store.clear_history();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(store.changes().subscriber_count(), 0);
}

#[test]
fn test_consumer_may_dispose_another_mid_delivery() {
    let store = ResultStore::new();
    let late = Arc::new(AtomicUsize::new(0));

    let victim = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&victim);
    let _killer = store.subscribe("killer", move |_: &StoreChange| {
        if let Some(sub) = slot.lock().unwrap().take() {
            testlens::Subscription::dispose(sub);
        }
        Ok(())
    });
    *victim.lock().unwrap() = Some(store.subscribe("victim", counting(&late)));

    store.clear_history();
    assert_eq!(late.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_channel_consumer_receives_in_order() {
    let store = ResultStore::new();
    let (_sub, mut rx) = store.changes().subscribe_channel("async-view");

    store.upsert_result(common::result("t1", "a.test.ts", 1, TestStatus::Passed));
    store.clear_all();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.kind, ChangeKind::Results);
    assert_eq!(second.kind, ChangeKind::Cleared);
    assert!(second.sequence > first.sequence);
}
