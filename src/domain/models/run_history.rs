//! Completed test-run history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::test_result::{TestResult, TestStatus};

/// Maximum number of run history entries retained by the result store.
pub const HISTORY_RETENTION: usize = 100;

/// One completed run: a batch of results observed together.
///
/// `tests` holds owned snapshots, never references into the live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunHistory {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Sum of member durations in milliseconds.
    pub duration: u64,
    pub tests: Vec<TestResult>,
}

impl TestRunHistory {
    /// Aggregate a batch into a history entry.
    ///
    /// `pending` and `running` members produced no outcome and are counted
    /// as skipped so that `passed + failed + skipped == total_tests`.
    pub fn from_results(id: u64, timestamp: DateTime<Utc>, results: &[TestResult]) -> Self {
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut duration: u64 = 0;

        for result in results {
            match result.status {
                TestStatus::Passed => passed += 1,
                TestStatus::Failed => failed += 1,
                TestStatus::Skipped | TestStatus::Pending | TestStatus::Running => skipped += 1,
            }
            duration = duration.saturating_add(result.duration);
        }

        Self {
            id,
            timestamp,
            total_tests: results.len(),
            passed,
            failed,
            skipped,
            duration,
            tests: results.to_vec(),
        }
    }

    /// Check the aggregate invariants against the member list.
    pub fn is_consistent(&self) -> bool {
        let summed = self
            .tests
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.duration));
        self.passed + self.failed + self.skipped == self.total_tests
            && self.total_tests == self.tests.len()
            && self.duration == summed
    }

    /// Look up the occurrence of a test in this run.
    pub fn find(&self, test_id: &str) -> Option<&TestResult> {
        self.tests.iter().find(|t| t.id == test_id)
    }

    /// Fraction of members that passed, 0.0 for an empty run.
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.passed as f64 / self.total_tests as f64
        }
    }
}
