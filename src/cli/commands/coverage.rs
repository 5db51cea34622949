//! Coverage summary and gap report for a single coverage update.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::cli::display::{list_table, render_list};
use crate::cli::output::{output, percent, truncate, CommandOutput};
use crate::domain::models::{
    Config, CoverageGap, CoveragePercentages, CoverageThresholds, CoverageUpdatePayload,
    LineRange,
};
use crate::services::CoverageAggregator;

#[derive(Debug, Serialize)]
pub struct CoverageReportOutput {
    pub files: usize,
    pub summary: CoveragePercentages,
    pub thresholds: CoverageThresholds,
    pub gaps: Vec<CoverageGap>,
}

fn format_ranges(ranges: &[LineRange]) -> String {
    if ranges.is_empty() {
        return "-".to_string();
    }
    ranges
        .iter()
        .map(|r| {
            if r.start == r.end {
                r.start.to_string()
            } else {
                format!("{}-{}", r.start, r.end)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl CommandOutput for CoverageReportOutput {
    fn to_human(&self) -> String {
        let mut summary = list_table(&["Dimension", "Covered", "Threshold"]);
        for (name, value, threshold) in [
            ("lines", self.summary.lines, self.thresholds.lines),
            ("branches", self.summary.branches, self.thresholds.branches),
            ("functions", self.summary.functions, self.thresholds.functions),
            ("statements", self.summary.statements, self.thresholds.statements),
        ] {
            summary.add_row(vec![name.to_string(), percent(value), percent(threshold)]);
        }

        let mut gaps = list_table(&["File", "Dimension", "Covered", "Uncovered Lines"]);
        for gap in &self.gaps {
            gaps.add_row(vec![
                truncate(&gap.file, 48),
                format!("{:?}", gap.kind).to_lowercase(),
                percent(gap.percent),
                truncate(&format_ranges(&gap.ranges), 40),
            ]);
        }

        format!(
            "Coverage across {} files\n{summary}\n\n{}",
            self.files,
            render_list("gap", &gaps, self.gaps.len())
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Apply `update` to a fresh aggregator and report against `config` thresholds.
pub fn report(update: CoverageUpdatePayload, config: &Config) -> CoverageReportOutput {
    let aggregator = CoverageAggregator::new(&config.coverage);
    aggregator.apply_update(update);
    CoverageReportOutput {
        files: aggregator.files().len(),
        summary: aggregator.get_summary(),
        thresholds: config.coverage.thresholds,
        gaps: aggregator.get_gaps(&config.coverage.thresholds),
    }
}

pub fn execute(update: &Path, config: &Config, json: bool) -> Result<()> {
    let body = fs::read_to_string(update)
        .with_context(|| format!("Failed to read coverage update {}", update.display()))?;
    let payload: CoverageUpdatePayload =
        serde_json::from_str(&body).context("File is not a coverage update")?;

    output(&report(payload, config), json);
    Ok(())
}
