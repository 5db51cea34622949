//! Flaky-test models. These are derived from run history, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::test_result::TestStatus;

/// Severity band for a flaky test's failure rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlakySeverity {
    Low,
    Medium,
    High,
}

impl FlakySeverity {
    /// `>= 0.3` is high, `[0.1, 0.3)` is medium, anything lower is low.
    pub fn from_failure_rate(rate: f64) -> Self {
        if rate >= 0.3 {
            Self::High
        } else if rate >= 0.1 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for FlakySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probable cause category.
///
/// Declaration order is the tie-break priority when confidences are equal:
/// earlier variants rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CauseType {
    Timing,
    RaceCondition,
    ExternalDependency,
    RandomData,
    Unknown,
}

impl CauseType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timing => "timing",
            Self::RaceCondition => "race-condition",
            Self::ExternalDependency => "external-dependency",
            Self::RandomData => "random-data",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CauseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyCause {
    #[serde(rename = "type")]
    pub cause_type: CauseType,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub description: String,
}

/// Outcome of a flaky test in one retained run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyRunOutcome {
    pub run_id: u64,
    pub timestamp: DateTime<Utc>,
    pub status: TestStatus,
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyTest {
    pub test_id: String,
    pub name: String,
    pub total_runs: usize,
    pub failures: usize,
    pub failure_rate: f64,
    pub severity: FlakySeverity,
    pub causes: Vec<FlakyCause>,
    /// Most recent first.
    pub history: Vec<FlakyRunOutcome>,
}

impl FlakyTest {
    pub fn primary_cause(&self) -> Option<&FlakyCause> {
        self.causes.first()
    }
}

/// Options for server-side flaky detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlakyDetectionOptions {
    pub iterations: u32,
}

/// Server analysis of a single failing test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysis {
    pub test_id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}
