//! Domain models for the testlens core.

pub mod change;
pub mod config;
pub mod coverage;
pub mod events;
pub mod flaky;
pub mod run_history;
pub mod test_result;

pub use change::{ChangeKind, StoreChange};
pub use config::{ClientConfig, Config, CoverageConfig, FlakyConfig, LoggingConfig};
pub use coverage::{
    BranchHit, CoverageGap, CoverageMetric, CoveragePercentages, CoverageSnapshot,
    CoverageSummary, CoverageThresholds, CoverageTrendPoint, FunctionHit, GapKind, LineRange,
    TrendDirection,
};
pub use events::{ClientEvent, CoverageUpdatePayload, RunOptions, TestEventPayload};
pub use flaky::{
    CauseType, FailureAnalysis, FlakyCause, FlakyDetectionOptions, FlakyRunOutcome, FlakySeverity,
    FlakyTest,
};
pub use run_history::{TestRunHistory, HISTORY_RETENTION};
pub use test_result::{TestError, TestResult, TestStatus};
