//! Coverage aggregation across files.
//!
//! Keeps the last snapshot per file, a weighted summary across all files
//! and a bounded trend of summary percentages.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::errors::ConsumerError;
use crate::domain::fanout::{Fanout, Subscription};
use crate::domain::models::{
    ChangeKind, CoverageConfig, CoverageGap, CoveragePercentages, CoverageSnapshot,
    CoverageSummary, CoverageThresholds, CoverageTrendPoint, CoverageUpdatePayload, GapKind,
    LineRange, StoreChange, TrendDirection,
};

/// Line-percentage delta below which the trend counts as stable.
const TREND_DEAD_BAND: f64 = 0.5;

#[derive(Default)]
struct CoverageState {
    files: BTreeMap<String, CoverageSnapshot>,
    /// Oldest first.
    trend: VecDeque<CoverageTrendPoint>,
}

impl CoverageState {
    fn summary(&self) -> CoverageSummary {
        self.files
            .values()
            .fold(CoverageSummary::default(), |acc, s| acc.merged(s.summary))
    }

    fn push_trend(&mut self, timestamp: DateTime<Utc>, capacity: usize) {
        let percentages = self.summary().percentages();
        self.trend.push_back(CoverageTrendPoint {
            timestamp,
            percentages,
        });
        while self.trend.len() > capacity {
            self.trend.pop_front();
        }
    }
}

/// Owner of coverage snapshots and the coverage trend.
pub struct CoverageAggregator {
    state: RwLock<CoverageState>,
    trend_capacity: usize,
    changes: Fanout<StoreChange>,
    sequence: AtomicU64,
}

impl Default for CoverageAggregator {
    fn default() -> Self {
        Self::new(&CoverageConfig::default())
    }
}

impl CoverageAggregator {
    pub fn new(config: &CoverageConfig) -> Self {
        Self {
            state: RwLock::new(CoverageState::default()),
            trend_capacity: config.trend_history_size.max(1),
            changes: Fanout::new(),
            sequence: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CoverageState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CoverageState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.changes.emit(&StoreChange {
            kind: ChangeKind::Coverage,
            sequence,
        });
    }

    /// Replace the snapshot for `file` and append one trend point.
    pub fn apply_snapshot(&self, file: impl Into<String>, snapshot: CoverageSnapshot) {
        self.apply_snapshot_at(file, snapshot, Utc::now());
    }

    pub fn apply_snapshot_at(
        &self,
        file: impl Into<String>,
        snapshot: CoverageSnapshot,
        timestamp: DateTime<Utc>,
    ) {
        let file = file.into();
        {
            let mut state = self.write();
            state.files.insert(file.clone(), snapshot.normalized());
            state.push_trend(timestamp, self.trend_capacity);
        }
        tracing::debug!(file = %file, "coverage snapshot applied");
        self.notify();
    }

    /// Apply a multi-file update as one change with one trend point.
    pub fn apply_update(&self, update: CoverageUpdatePayload) {
        if update.files.is_empty() {
            tracing::debug!("empty coverage update ignored");
            return;
        }
        let count = update.files.len();
        {
            let mut state = self.write();
            state.files.extend(
                update
                    .files
                    .into_iter()
                    .map(|(file, snapshot)| (file, snapshot.normalized())),
            );
            state.push_trend(Utc::now(), self.trend_capacity);
        }
        tracing::debug!(files = count, "coverage update applied");
        self.notify();
    }

    /// Weighted across files by countable units, not by file count.
    pub fn get_summary(&self) -> CoveragePercentages {
        self.read().summary().percentages()
    }

    /// Summed unit counts across all files.
    pub fn get_totals(&self) -> CoverageSummary {
        self.read().summary()
    }

    /// Uncovered regions for every file and dimension below its threshold.
    ///
    /// Files are in path order; within a file, dimensions in
    /// lines/branches/functions/statements order.
    pub fn get_gaps(&self, thresholds: &CoverageThresholds) -> Vec<CoverageGap> {
        let state = self.read();
        let mut gaps = Vec::new();

        for (file, snapshot) in &state.files {
            for kind in [
                GapKind::Lines,
                GapKind::Branches,
                GapKind::Functions,
                GapKind::Statements,
            ] {
                let metric = match kind {
                    GapKind::Lines => snapshot.summary.lines,
                    GapKind::Branches => snapshot.summary.branches,
                    GapKind::Functions => snapshot.summary.functions,
                    GapKind::Statements => snapshot.summary.statements,
                };
                if metric.total == 0 {
                    continue;
                }
                let percent = metric.percent();
                if percent >= thresholds.for_kind(kind) {
                    continue;
                }
                gaps.push(CoverageGap {
                    file: file.clone(),
                    kind,
                    percent,
                    ranges: contiguous_ranges(&uncovered_lines(snapshot, kind)),
                });
            }
        }
        gaps
    }

    pub fn snapshot(&self, file: &str) -> Option<CoverageSnapshot> {
        self.read().files.get(file).cloned()
    }

    pub fn files(&self) -> Vec<String> {
        self.read().files.keys().cloned().collect()
    }

    /// Trend points, oldest first.
    pub fn trend(&self) -> Vec<CoverageTrendPoint> {
        self.read().trend.iter().cloned().collect()
    }

    /// Direction of the line percentage between the two newest trend points.
    pub fn trend_direction(&self) -> TrendDirection {
        let state = self.read();
        let mut newest = state.trend.iter().rev();
        match (newest.next(), newest.next()) {
            (Some(latest), Some(previous)) => {
                let delta = latest.percentages.lines - previous.percentages.lines;
                if delta > TREND_DEAD_BAND {
                    TrendDirection::Improving
                } else if delta < -TREND_DEAD_BAND {
                    TrendDirection::Declining
                } else {
                    TrendDirection::Stable
                }
            }
            _ => TrendDirection::Stable,
        }
    }

    /// Drop all snapshots and the trend.
    pub fn clear(&self) {
        *self.write() = CoverageState::default();
        tracing::debug!("coverage cleared");
        self.notify();
    }

    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&StoreChange) -> Result<(), ConsumerError> + Send + Sync + 'static,
    {
        self.changes.subscribe(name, handler)
    }

    pub const fn changes(&self) -> &Fanout<StoreChange> {
        &self.changes
    }
}

fn uncovered_lines(snapshot: &CoverageSnapshot, kind: GapKind) -> BTreeSet<u32> {
    match kind {
        GapKind::Lines => zero_hit_lines(&snapshot.lines),
        GapKind::Statements => zero_hit_lines(&snapshot.statements),
        GapKind::Branches => snapshot
            .branches
            .iter()
            .filter(|b| b.hits == 0)
            .map(|b| b.line)
            .collect(),
        GapKind::Functions => snapshot
            .functions
            .iter()
            .filter(|f| f.hits == 0)
            .map(|f| f.line)
            .collect(),
    }
}

fn zero_hit_lines(hits: &BTreeMap<u32, u64>) -> BTreeSet<u32> {
    hits.iter()
        .filter(|(_, hits)| **hits == 0)
        .map(|(&line, _)| line)
        .collect()
}

fn contiguous_ranges(lines: &BTreeSet<u32>) -> Vec<LineRange> {
    let mut ranges: Vec<LineRange> = Vec::new();
    for &line in lines {
        match ranges.last_mut() {
            Some(range) if range.end + 1 == line => range.end = line,
            _ => ranges.push(LineRange {
                start: line,
                end: line,
            }),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BranchHit, CoverageMetric, FunctionHit};
    use chrono::Duration;
    use std::collections::HashMap;

    fn lines_only(total: u64, covered: u64) -> CoverageSnapshot {
        CoverageSnapshot::from_summary(CoverageSummary {
            lines: CoverageMetric::new(total, covered),
            ..CoverageSummary::default()
        })
    }

    #[test]
    fn test_weighted_summary() {
        let aggregator = CoverageAggregator::default();
        aggregator.apply_snapshot("a.ts", lines_only(100, 80));
        aggregator.apply_snapshot("b.ts", lines_only(10, 10));

        let summary = aggregator.get_summary();
        assert!((summary.lines - 90.0 * 100.0 / 110.0).abs() < 1e-9);
        assert!((summary.lines - 81.818).abs() < 0.01);
    }

    #[test]
    fn test_last_snapshot_wins() {
        let aggregator = CoverageAggregator::default();
        aggregator.apply_snapshot("a.ts", lines_only(10, 1));
        aggregator.apply_snapshot("a.ts", lines_only(10, 9));

        assert_eq!(aggregator.files(), vec!["a.ts".to_string()]);
        assert!((aggregator.get_summary().lines - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_is_bounded() {
        let aggregator = CoverageAggregator::new(&CoverageConfig {
            trend_history_size: 3,
            ..CoverageConfig::default()
        });
        let start = Utc::now();
        for i in 0..5u64 {
            aggregator.apply_snapshot_at(
                "a.ts",
                lines_only(10, i),
                start + Duration::seconds(i64::try_from(i).unwrap()),
            );
        }

        let trend = aggregator.trend();
        assert_eq!(trend.len(), 3);
        assert!((trend[0].percentages.lines - 20.0).abs() < 1e-9);
        assert!((trend[2].percentages.lines - 40.0).abs() < 1e-9);
        assert_eq!(aggregator.trend_direction(), TrendDirection::Improving);
    }

    #[test]
    fn test_trend_direction_declining_and_stable() {
        let aggregator = CoverageAggregator::default();
        assert_eq!(aggregator.trend_direction(), TrendDirection::Stable);

        aggregator.apply_snapshot("a.ts", lines_only(100, 90));
        aggregator.apply_snapshot("a.ts", lines_only(100, 70));
        assert_eq!(aggregator.trend_direction(), TrendDirection::Declining);

        aggregator.apply_snapshot("a.ts", lines_only(1000, 700));
        assert_eq!(aggregator.trend_direction(), TrendDirection::Stable);
    }

    #[test]
    fn test_gaps_grouped_contiguously() {
        let aggregator = CoverageAggregator::default();
        let lines = BTreeMap::from([(1, 1), (2, 0), (3, 0), (4, 0), (5, 2), (6, 1), (9, 0)]);
        let branches = vec![
            BranchHit { line: 2, index: 0, hits: 0 },
            BranchHit { line: 2, index: 1, hits: 0 },
            BranchHit { line: 5, index: 0, hits: 3 },
        ];
        let functions = vec![FunctionHit { name: "f".into(), line: 1, hits: 1 }];
        aggregator.apply_snapshot(
            "src/a.ts",
            CoverageSnapshot::from_hits(lines, branches, functions, BTreeMap::new()),
        );

        let gaps = aggregator.get_gaps(&CoverageThresholds::default());
        assert_eq!(gaps.len(), 2);

        assert_eq!(gaps[0].kind, GapKind::Lines);
        assert_eq!(
            gaps[0].ranges,
            vec![LineRange { start: 2, end: 4 }, LineRange { start: 9, end: 9 }]
        );
        assert_eq!(gaps[1].kind, GapKind::Branches);
        assert_eq!(gaps[1].ranges, vec![LineRange { start: 2, end: 2 }]);
    }

    #[test]
    fn test_files_above_threshold_have_no_gaps() {
        let aggregator = CoverageAggregator::default();
        aggregator.apply_snapshot("ok.ts", lines_only(10, 9));
        assert!(aggregator.get_gaps(&CoverageThresholds::default()).is_empty());

        let strict = CoverageThresholds {
            lines: 95.0,
            ..CoverageThresholds::default()
        };
        let gaps = aggregator.get_gaps(&strict);
        assert_eq!(gaps.len(), 1);
        // summary-only snapshots report the gap without ranges
        assert!(gaps[0].ranges.is_empty());
    }

    #[test]
    fn test_apply_update_single_trend_point() {
        let aggregator = CoverageAggregator::default();
        let mut files = HashMap::new();
        files.insert("a.ts".to_string(), lines_only(10, 5));
        files.insert("b.ts".to_string(), lines_only(10, 10));
        aggregator.apply_update(CoverageUpdatePayload { files });

        assert_eq!(aggregator.files().len(), 2);
        assert_eq!(aggregator.trend().len(), 1);

        aggregator.apply_update(CoverageUpdatePayload::default());
        assert_eq!(aggregator.trend().len(), 1);
    }

    #[test]
    fn test_over_reported_file_does_not_lift_summary() {
        let aggregator = CoverageAggregator::default();
        aggregator.apply_snapshot("a.ts", lines_only(10, 20));
        aggregator.apply_snapshot("b.ts", lines_only(10, 0));

        assert!((aggregator.get_summary().lines - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_saturates_on_huge_totals() {
        let aggregator = CoverageAggregator::default();
        let mut files = HashMap::new();
        files.insert("a.ts".to_string(), lines_only(u64::MAX, u64::MAX));
        files.insert("b.ts".to_string(), lines_only(u64::MAX, 0));
        aggregator.apply_update(CoverageUpdatePayload { files });

        let summary = aggregator.get_summary();
        assert!(summary.lines.is_finite());
        assert!((0.0..=100.0).contains(&summary.lines));
    }

    #[test]
    fn test_clear() {
        let aggregator = CoverageAggregator::default();
        aggregator.apply_snapshot("a.ts", lines_only(10, 5));
        aggregator.clear();
        assert!(aggregator.files().is_empty());
        assert!(aggregator.trend().is_empty());
        assert!(aggregator.get_summary().lines.abs() < 1e-9);
    }
}
