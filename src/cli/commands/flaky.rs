//! Flaky-test report over an exported run history.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::cli::display::{list_table, render_list};
use crate::cli::output::{output, percent, truncate, CommandOutput};
use crate::domain::models::{Config, FlakyTest, TestRunHistory};
use crate::services::{FlakyAnalyzer, ResultStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyReportOutput {
    pub runs_analyzed: usize,
    pub flaky: Vec<FlakyTest>,
}

impl CommandOutput for FlakyReportOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["Test", "Severity", "Failure Rate", "Runs", "Likely Cause"]);
        for test in &self.flaky {
            let cause = test.primary_cause().map_or_else(
                || "-".to_string(),
                |c| format!("{} ({:.0}%)", c.cause_type, c.confidence * 100.0),
            );
            table.add_row(vec![
                truncate(&test.name, 40),
                test.severity.to_string(),
                percent(test.failure_rate * 100.0),
                format!("{}/{}", test.failures, test.total_runs),
                cause,
            ]);
        }
        format!(
            "Analyzed {} runs\n{}",
            self.runs_analyzed,
            render_list("flaky test", &table, self.flaky.len())
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Import `history` into a fresh store and classify it.
pub fn analyze_history(history: Vec<TestRunHistory>, config: &Config) -> Result<FlakyReportOutput> {
    let store = ResultStore::new();
    let runs_analyzed = store
        .import_history(history)
        .context("Exported history is inconsistent")?;
    let flaky = FlakyAnalyzer::new(&config.flaky).analyze_store(&store);
    Ok(FlakyReportOutput {
        runs_analyzed,
        flaky,
    })
}

pub fn execute(history: &Path, config: &Config, json: bool) -> Result<()> {
    let body = fs::read_to_string(history)
        .with_context(|| format!("Failed to read history {}", history.display()))?;
    let entries: Vec<TestRunHistory> =
        serde_json::from_str(&body).context("History file is not a run history export")?;

    let report = analyze_history(entries, config)?;
    output(&report, json);
    Ok(())
}
