//! Result store: the single source of truth for current test results and
//! bounded run history.
//!
//! Every method is synchronous. State lives behind one lock and no method
//! suspends while holding it, so `record_run` is observed atomically: the
//! history entry and all member upserts become visible together.
//! Notifications are emitted only after the lock has been released.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::errors::{ConsumerError, InsightError, InsightResult};
use crate::domain::fanout::{Fanout, Subscription};
use crate::domain::models::{
    ChangeKind, StoreChange, TestResult, TestRunHistory, HISTORY_RETENTION,
};

struct Entry {
    result: TestResult,
    /// First-insertion order; kept across updates.
    seq: u64,
}

#[derive(Default)]
struct StoreState {
    results: HashMap<String, Entry>,
    by_file: HashMap<String, BTreeSet<(u32, u64, String)>>,
    by_suite: HashMap<Vec<String>, BTreeSet<(u64, String)>>,
    by_tag: HashMap<String, BTreeSet<(u64, String)>>,
    /// Newest first.
    history: VecDeque<TestRunHistory>,
    next_seq: u64,
    last_run_id: u64,
    history_generation: u64,
}

impl StoreState {
    fn apply(&mut self, result: TestResult) {
        let seq = match self.results.remove(&result.id) {
            Some(old) => {
                self.unindex(&old.result, old.seq);
                old.seq
            }
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.index(&result, seq);
        self.results.insert(result.id.clone(), Entry { result, seq });
    }

    fn index(&mut self, result: &TestResult, seq: u64) {
        self.by_file
            .entry(result.file.clone())
            .or_default()
            .insert((result.line, seq, result.id.clone()));
        self.by_suite
            .entry(result.suite.clone())
            .or_default()
            .insert((seq, result.id.clone()));
        for tag in &result.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert((seq, result.id.clone()));
        }
    }

    fn unindex(&mut self, result: &TestResult, seq: u64) {
        remove_from(&mut self.by_file, &result.file, &(result.line, seq, result.id.clone()));
        remove_from(&mut self.by_suite, &result.suite, &(seq, result.id.clone()));
        for tag in &result.tags {
            remove_from(&mut self.by_tag, tag, &(seq, result.id.clone()));
        }
    }

    fn resolve<'a, I>(&self, ids: I) -> Vec<TestResult>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .filter_map(|id| self.results.get(id).map(|e| e.result.clone()))
            .collect()
    }

    /// Ids are time-derived but forced strictly increasing.
    fn next_run_id(&mut self, timestamp: DateTime<Utc>) -> u64 {
        let millis = u64::try_from(timestamp.timestamp_millis()).unwrap_or(0);
        let id = millis.max(self.last_run_id + 1);
        self.last_run_id = id;
        id
    }

    fn push_history(&mut self, entry: TestRunHistory) {
        self.history.push_front(entry);
        while self.history.len() > HISTORY_RETENTION {
            self.history.pop_back();
        }
        self.history_generation += 1;
    }
}

fn remove_from<K, V>(index: &mut HashMap<K, BTreeSet<V>>, key: &K, value: &V)
where
    K: std::hash::Hash + Eq,
    V: Ord,
{
    if let Some(set) = index.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// Reconciled test results and run history.
pub struct ResultStore {
    state: RwLock<StoreState>,
    changes: Fanout<StoreChange>,
    sequence: AtomicU64,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("ResultStore")
            .field("results", &state.results.len())
            .field("history", &state.history.len())
            .finish_non_exhaustive()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            changes: Fanout::new(),
            sequence: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, kind: ChangeKind) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.changes.emit(&StoreChange { kind, sequence });
    }

    /// Insert or replace the entry for `result.id`.
    ///
    /// Fires exactly one notification per call, even when the stored value
    /// did not change.
    pub fn upsert_result(&self, result: TestResult) {
        tracing::debug!(test_id = %result.id, status = %result.status, "upserting test result");
        self.write().apply(result);
        self.notify(ChangeKind::Results);
    }

    /// Record a completed batch as one history entry, then upsert every member.
    pub fn record_run(&self, results: Vec<TestResult>) -> TestRunHistory {
        self.record_run_at(results, Utc::now())
    }

    /// [`Self::record_run`] with an explicit run timestamp.
    pub fn record_run_at(&self, results: Vec<TestResult>, timestamp: DateTime<Utc>) -> TestRunHistory {
        let member_count = results.len();
        let entry = {
            let mut state = self.write();
            let id = state.next_run_id(timestamp);
            let entry = TestRunHistory::from_results(id, timestamp, &results);
            state.push_history(entry.clone());
            for result in results {
                state.apply(result);
            }
            entry
        };

        tracing::info!(
            run_id = entry.id,
            total = entry.total_tests,
            passed = entry.passed,
            failed = entry.failed,
            skipped = entry.skipped,
            duration_ms = entry.duration,
            "test run recorded"
        );

        self.notify(ChangeKind::History);
        for _ in 0..member_count {
            self.notify(ChangeKind::Results);
        }
        entry
    }

    pub fn get_by_id(&self, id: &str) -> Option<TestResult> {
        self.read().results.get(id).map(|e| e.result.clone())
    }

    /// Results declared in `file`, by line, ties in first-insertion order.
    pub fn list_by_file(&self, file: &str) -> Vec<TestResult> {
        let state = self.read();
        state
            .by_file
            .get(file)
            .map(|set| state.resolve(set.iter().map(|(_, _, id)| id)))
            .unwrap_or_default()
    }

    /// Results whose suite path starts with `path`, in first-insertion order.
    ///
    /// An empty path matches every result.
    pub fn list_by_suite<S: AsRef<str>>(&self, path: &[S]) -> Vec<TestResult> {
        let state = self.read();
        let mut matched: BTreeSet<&(u64, String)> = BTreeSet::new();
        for (suite, members) in &state.by_suite {
            let is_prefix = suite.len() >= path.len()
                && suite.iter().zip(path).all(|(a, b)| a == b.as_ref());
            if is_prefix {
                matched.extend(members.iter());
            }
        }
        state.resolve(matched.into_iter().map(|(_, id)| id))
    }

    /// Results carrying `tag`, in first-insertion order.
    pub fn list_by_tag(&self, tag: &str) -> Vec<TestResult> {
        let state = self.read();
        state
            .by_tag
            .get(tag)
            .map(|set| state.resolve(set.iter().map(|(_, id)| id)))
            .unwrap_or_default()
    }

    /// Every current result, in first-insertion order.
    pub fn all_results(&self) -> Vec<TestResult> {
        let state = self.read();
        let mut entries: Vec<&Entry> = state.results.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.result.clone()).collect()
    }

    pub fn result_count(&self) -> usize {
        self.read().results.len()
    }

    pub fn history_len(&self) -> usize {
        self.read().history.len()
    }

    /// Bumped on every history mutation.
    pub fn history_generation(&self) -> u64 {
        self.read().history_generation
    }

    /// Empty the run history. Current results are untouched.
    pub fn clear_history(&self) {
        {
            let mut state = self.write();
            state.history.clear();
            state.history_generation += 1;
        }
        tracing::debug!("run history cleared");
        self.notify(ChangeKind::History);
    }

    /// Drop every result, index and history entry.
    pub fn clear_all(&self) {
        {
            let mut state = self.write();
            let generation = state.history_generation + 1;
            let last_run_id = state.last_run_id;
            *state = StoreState {
                history_generation: generation,
                last_run_id,
                ..StoreState::default()
            };
        }
        tracing::debug!("result store cleared");
        self.notify(ChangeKind::Cleared);
    }

    /// Deep copy of the run history, newest first.
    pub fn export_history(&self) -> Vec<TestRunHistory> {
        self.read().history.iter().cloned().collect()
    }

    /// Replace the run history with previously exported entries.
    ///
    /// Entries are ordered newest first and capped at the retention limit.
    /// Inconsistent entries reject the whole import and leave the store
    /// unchanged.
    pub fn import_history(&self, mut entries: Vec<TestRunHistory>) -> InsightResult<usize> {
        if let Some(bad) = entries.iter().find(|e| !e.is_consistent()) {
            return Err(InsightError::InvalidArgument(format!(
                "run {} has inconsistent aggregates",
                bad.id
            )));
        }

        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(HISTORY_RETENTION);
        let imported = entries.len();

        {
            let mut state = self.write();
            if let Some(newest) = entries.first() {
                state.last_run_id = state.last_run_id.max(newest.id);
            }
            state.history = entries.into();
            state.history_generation += 1;
        }

        tracing::info!(runs = imported, "run history imported");
        self.notify(ChangeKind::History);
        Ok(imported)
    }

    /// Register a change consumer.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&StoreChange) -> Result<(), ConsumerError> + Send + Sync + 'static,
    {
        self.changes.subscribe(name, handler)
    }

    /// The store's fan-out, for channel-based consumers.
    pub const fn changes(&self) -> &Fanout<StoreChange> {
        &self.changes
    }
}
