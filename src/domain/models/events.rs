//! Inbound wire payloads from the testing server.
//!
//! Every field is optional on the wire so that incomplete events can be
//! recognised and dropped instead of failing deserialization of a whole
//! stream.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::coverage::CoverageSnapshot;
use super::test_result::{TestError, TestResult, TestStatus};
use crate::domain::errors::{InsightError, InsightResult};

/// Raw test lifecycle payload, as emitted by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEventPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub suite: Option<Vec<String>>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub status: Option<TestStatus>,
    /// Milliseconds; runners may report fractions.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub error: Option<TestError>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
}

impl TestEventPayload {
    /// Validate a `test started` payload. The status is forced to running.
    pub fn into_started(self) -> InsightResult<TestResult> {
        self.into_result(Some(TestStatus::Running))
    }

    /// Validate a `test completed` payload. A status is required.
    pub fn into_completed(self) -> InsightResult<TestResult> {
        self.into_result(None)
    }

    fn into_result(self, forced_status: Option<TestStatus>) -> InsightResult<TestResult> {
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => return Err(InsightError::MalformedEvent("empty test id".to_string())),
            None => return Err(InsightError::MalformedEvent("missing test id".to_string())),
        };

        let status = match (forced_status, self.status) {
            (Some(forced), _) => forced,
            (None, Some(status)) => status,
            (None, None) => {
                return Err(InsightError::MalformedEvent(format!(
                    "test {id}: missing status"
                )))
            }
        };

        let duration = match self.duration {
            None => 0,
            Some(ms) => wire_millis(ms).ok_or_else(|| {
                InsightError::MalformedEvent(format!("test {id}: invalid duration {ms}"))
            })?,
        };

        let name = self.name.unwrap_or_else(|| id.clone());
        let full_name = self.full_name.unwrap_or_else(|| name.clone());

        Ok(TestResult {
            id,
            name,
            full_name,
            suite: self.suite.unwrap_or_default(),
            file: self.file.unwrap_or_default(),
            line: self.line.unwrap_or_default(),
            status,
            duration,
            error: self.error,
            tags: self.tags.unwrap_or_default(),
        })
    }
}

/// Round a wire duration to whole milliseconds; `None` for negative or
/// non-finite values.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn wire_millis(ms: f64) -> Option<u64> {
    if ms.is_finite() && ms >= 0.0 {
        // saturates at u64::MAX
        Some(ms.round() as u64)
    } else {
        None
    }
}

impl From<&TestResult> for TestEventPayload {
    #[allow(clippy::cast_precision_loss)]
    fn from(result: &TestResult) -> Self {
        Self {
            id: Some(result.id.clone()),
            name: Some(result.name.clone()),
            full_name: Some(result.full_name.clone()),
            suite: Some(result.suite.clone()),
            file: Some(result.file.clone()),
            line: Some(result.line),
            status: Some(result.status),
            duration: Some(result.duration as f64),
            error: result.error.clone(),
            tags: Some(result.tags.clone()),
        }
    }
}

/// Coverage-updated payload: last snapshot per file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageUpdatePayload {
    #[serde(default)]
    pub files: HashMap<String, CoverageSnapshot>,
}

/// One decoded inbound event, as recorded in replay files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    TestStarted(TestEventPayload),
    TestCompleted(TestEventPayload),
    CoverageUpdated(CoverageUpdatePayload),
    /// A whole batch finished; recorded as one run history entry.
    RunCompleted { tests: Vec<TestEventPayload> },
}

impl ClientEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TestStarted(_) => "test_started",
            Self::TestCompleted(_) => "test_completed",
            Self::CoverageUpdated(_) => "coverage_updated",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// Options for a test run request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_path: Option<String>,
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub coverage: bool,
}

impl RunOptions {
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            test_path: Some(path.into()),
            ..Self::default()
        }
    }
}
