//! Coverage snapshot, summary and trend models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Countable units of one coverage dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMetric {
    pub total: u64,
    pub covered: u64,
}

impl CoverageMetric {
    pub const fn new(total: u64, covered: u64) -> Self {
        Self { total, covered }
    }

    /// Percentage in `[0, 100]`; a dimension with nothing to count is 0.
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.covered_units() as f64 * 100.0 / self.total as f64
        }
    }

    /// Covered units, never more than the total.
    pub const fn covered_units(&self) -> u64 {
        if self.covered > self.total {
            self.total
        } else {
            self.covered
        }
    }

    /// Sum of both metrics. Over-reported coverage is capped per metric
    /// first, so one bad file cannot lift the others.
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            total: self.total.saturating_add(other.total),
            covered: self.covered_units().saturating_add(other.covered_units()),
        }
    }

    fn from_hits<'a>(hits: impl Iterator<Item = &'a u64>) -> Self {
        let mut metric = Self::default();
        for &h in hits {
            metric.total += 1;
            if h > 0 {
                metric.covered += 1;
            }
        }
        metric
    }
}

/// Unit counts for all four dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub lines: CoverageMetric,
    pub branches: CoverageMetric,
    pub functions: CoverageMetric,
    pub statements: CoverageMetric,
}

impl CoverageSummary {
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            lines: self.lines.merged(other.lines),
            branches: self.branches.merged(other.branches),
            functions: self.functions.merged(other.functions),
            statements: self.statements.merged(other.statements),
        }
    }

    pub fn percentages(&self) -> CoveragePercentages {
        CoveragePercentages {
            lines: self.lines.percent(),
            branches: self.branches.percent(),
            functions: self.functions.percent(),
            statements: self.statements.percent(),
        }
    }
}

/// Summary percentages, as shown in views and recorded in the trend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoveragePercentages {
    pub lines: f64,
    pub branches: f64,
    pub functions: f64,
    pub statements: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHit {
    pub line: u32,
    pub index: u32,
    pub hits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHit {
    pub name: String,
    pub line: u32,
    pub hits: u64,
}

/// Coverage data for one file. The last snapshot per file wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    #[serde(default)]
    pub lines: BTreeMap<u32, u64>,
    #[serde(default)]
    pub branches: Vec<BranchHit>,
    #[serde(default)]
    pub functions: Vec<FunctionHit>,
    #[serde(default)]
    pub statements: BTreeMap<u32, u64>,
    #[serde(default)]
    pub summary: CoverageSummary,
}

impl CoverageSnapshot {
    /// Build a snapshot and derive its summary from the hit maps.
    pub fn from_hits(
        lines: BTreeMap<u32, u64>,
        branches: Vec<BranchHit>,
        functions: Vec<FunctionHit>,
        statements: BTreeMap<u32, u64>,
    ) -> Self {
        let summary = CoverageSummary {
            lines: CoverageMetric::from_hits(lines.values()),
            branches: CoverageMetric::from_hits(branches.iter().map(|b| &b.hits)),
            functions: CoverageMetric::from_hits(functions.iter().map(|f| &f.hits)),
            statements: CoverageMetric::from_hits(statements.values()),
        };
        Self {
            lines,
            branches,
            functions,
            statements,
            summary,
        }
    }

    /// Fill in a missing summary from the hit maps.
    ///
    /// Wire snapshots may carry hits without counts; an explicit summary is
    /// kept as sent.
    #[must_use]
    pub fn normalized(self) -> Self {
        let has_hits = !(self.lines.is_empty()
            && self.branches.is_empty()
            && self.functions.is_empty()
            && self.statements.is_empty());
        if self.summary == CoverageSummary::default() && has_hits {
            Self::from_hits(self.lines, self.branches, self.functions, self.statements)
        } else {
            self
        }
    }

    /// Snapshot carrying only summary counts.
    pub fn from_summary(summary: CoverageSummary) -> Self {
        Self {
            summary,
            ..Self::default()
        }
    }
}

/// One entry of the bounded coverage trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageTrendPoint {
    pub timestamp: DateTime<Utc>,
    pub percentages: CoveragePercentages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Coverage dimension a gap refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    Lines,
    Branches,
    Functions,
    Statements,
}

/// Inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

/// Uncovered regions of one dimension in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub file: String,
    pub kind: GapKind,
    pub percent: f64,
    pub ranges: Vec<LineRange>,
}

/// Minimum acceptable percentage per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageThresholds {
    #[serde(default = "default_threshold")]
    pub lines: f64,
    #[serde(default = "default_threshold")]
    pub branches: f64,
    #[serde(default = "default_threshold")]
    pub functions: f64,
    #[serde(default = "default_threshold")]
    pub statements: f64,
}

const fn default_threshold() -> f64 {
    80.0
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            lines: default_threshold(),
            branches: default_threshold(),
            functions: default_threshold(),
            statements: default_threshold(),
        }
    }
}

impl CoverageThresholds {
    pub const fn for_kind(&self, kind: GapKind) -> f64 {
        match kind {
            GapKind::Lines => self.lines,
            GapKind::Branches => self.branches,
            GapKind::Functions => self.functions,
            GapKind::Statements => self.statements,
        }
    }
}
