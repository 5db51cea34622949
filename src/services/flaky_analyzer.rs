//! Flaky-test detection over retained run history.
//!
//! Stateless apart from a result cache keyed by the store's history
//! generation. A test is flaky when it appears in at least two retained
//! runs and its outcome varies between them.

use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{LazyLock, Mutex, PoisonError};

use crate::domain::models::{
    CauseType, FlakyCause, FlakyConfig, FlakyRunOutcome, FlakySeverity, FlakyTest, TestError,
    TestResult, TestRunHistory, TestStatus,
};
use crate::services::result_store::ResultStore;

/// Below this many retained runs a test is never reported.
pub const MIN_RUNS: usize = 2;

static TIMING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(timeout|timed out|settimeout|setinterval|\bawait\b|\basync\b|promise|deadline|\bsleep|timer)")
        .expect("timing pattern compiles")
});

static NETWORK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\bfetch|econnrefused|econnreset|enotfound|eai_again|socket|network|\bhttps?\b|\bdns\b|\b50[234]\b)")
        .expect("network pattern compiles")
});

static RACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(race|concurren|deadlock|\block\b|interleav)").expect("race pattern compiles")
});

static RANDOM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(random|\buuid|faker|\bseed\b)").expect("random pattern compiles")
});

static NUMERIC_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").expect("numeric pattern compiles"));

struct Occurrence<'a> {
    run: &'a TestRunHistory,
    result: &'a TestResult,
}

/// Computes [`FlakyTest`] reports from run history.
pub struct FlakyAnalyzer {
    history_window: usize,
    cache: Mutex<Option<(u64, Vec<FlakyTest>)>>,
}

impl Default for FlakyAnalyzer {
    fn default() -> Self {
        Self::new(&FlakyConfig::default())
    }
}

impl FlakyAnalyzer {
    pub fn new(config: &FlakyConfig) -> Self {
        Self {
            history_window: config.history_window.max(1),
            cache: Mutex::new(None),
        }
    }

    /// Analyze the store's retained history, reusing the previous result
    /// while the history is unchanged.
    pub fn analyze_store(&self, store: &ResultStore) -> Vec<FlakyTest> {
        let before = store.history_generation();
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((generation, cached)) = cache.as_ref() {
                if *generation == before {
                    return cached.clone();
                }
            }
        }

        let history = store.export_history();
        let flaky = self.analyze(&history);

        // history moved while we were reading; do not cache a mixed view
        if store.history_generation() == before {
            *self.cache.lock().unwrap_or_else(PoisonError::into_inner) =
                Some((before, flaky.clone()));
        }
        flaky
    }

    /// Flaky tests in `history` (newest first), highest failure rate first.
    pub fn analyze(&self, history: &[TestRunHistory]) -> Vec<FlakyTest> {
        let mut flaky: Vec<FlakyTest> = collect_occurrences(history)
            .into_iter()
            .filter_map(|(test_id, occurrences)| self.evaluate(test_id, &occurrences))
            .collect();

        flaky.sort_by(|a, b| {
            b.failure_rate
                .total_cmp(&a.failure_rate)
                .then_with(|| a.test_id.cmp(&b.test_id))
        });

        tracing::debug!(
            runs = history.len(),
            flaky = flaky.len(),
            "flaky analysis complete"
        );
        flaky
    }

    /// Report for a single test, if it qualifies as flaky.
    pub fn analyze_test(&self, history: &[TestRunHistory], test_id: &str) -> Option<FlakyTest> {
        let occurrences: Vec<Occurrence<'_>> = history
            .iter()
            .filter_map(|run| run.find(test_id).map(|result| Occurrence { run, result }))
            .collect();
        self.evaluate(test_id, &occurrences)
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, test_id: &str, occurrences: &[Occurrence<'_>]) -> Option<FlakyTest> {
        let total_runs = occurrences.len();
        if total_runs < MIN_RUNS {
            return None;
        }

        let failures = occurrences
            .iter()
            .filter(|o| o.result.status == TestStatus::Failed)
            .count();
        // never failed, or failed every time: stable either way
        if failures == 0 || failures == total_runs {
            return None;
        }

        let failure_rate = failures as f64 / total_runs as f64;
        let history = occurrences
            .iter()
            .take(self.history_window)
            .map(|o| FlakyRunOutcome {
                run_id: o.run.id,
                timestamp: o.run.timestamp,
                status: o.result.status,
                duration: o.result.duration,
                error_message: o.result.error.as_ref().map(|e| e.message.clone()),
            })
            .collect();

        Some(FlakyTest {
            test_id: test_id.to_string(),
            name: occurrences[0].result.name.clone(),
            total_runs,
            failures,
            failure_rate,
            severity: FlakySeverity::from_failure_rate(failure_rate),
            causes: attribute_causes(occurrences),
            history,
        })
    }
}

/// Occurrences per test id, newest run first. A run counts once per id.
fn collect_occurrences(history: &[TestRunHistory]) -> BTreeMap<&str, Vec<Occurrence<'_>>> {
    let mut by_test: BTreeMap<&str, Vec<Occurrence<'_>>> = BTreeMap::new();
    for run in history {
        let mut seen: HashSet<&str> = HashSet::new();
        for result in &run.tests {
            if seen.insert(result.id.as_str()) {
                by_test
                    .entry(result.id.as_str())
                    .or_default()
                    .push(Occurrence { run, result });
            }
        }
    }
    by_test
}

/// Ranked causes: confidence descending, ties by [`CauseType`] order.
#[allow(clippy::cast_precision_loss)]
fn attribute_causes(occurrences: &[Occurrence<'_>]) -> Vec<FlakyCause> {
    let failing: Vec<String> = occurrences
        .iter()
        .filter(|o| o.result.status == TestStatus::Failed)
        .filter_map(|o| o.result.error.as_ref().map(TestError::text))
        .collect();

    let mut found: HashMap<CauseType, (f64, String)> = HashMap::new();
    let mut propose = |cause: CauseType, confidence: f64, description: String| {
        let confidence = confidence.clamp(0.0, 1.0);
        let slot = found.entry(cause).or_insert((confidence, description.clone()));
        if confidence > slot.0 {
            *slot = (confidence, description);
        }
    };

    if !failing.is_empty() {
        let n = failing.len() as f64;
        let ratio = |pattern: &Regex| {
            failing.iter().filter(|t| pattern.is_match(t)).count() as f64 / n
        };

        let timing = ratio(&*TIMING_PATTERN);
        if timing > 0.0 {
            propose(
                CauseType::Timing,
                0.5 + 0.4 * timing,
                "Failures mention timers, timeouts or async waits".to_string(),
            );
        }

        let network = ratio(&*NETWORK_PATTERN);
        if network > 0.0 {
            propose(
                CauseType::ExternalDependency,
                0.5 + 0.4 * network,
                "Failures mention network or remote service errors".to_string(),
            );
        }

        let race = ratio(&*RACE_PATTERN);
        if race > 0.0 {
            propose(
                CauseType::RaceCondition,
                0.5 + 0.4 * race,
                "Failures mention concurrency or locking".to_string(),
            );
        }

        let random = ratio(&*RANDOM_PATTERN);
        if random > 0.0 {
            propose(
                CauseType::RandomData,
                0.5 + 0.4 * random,
                "Failures mention random or generated data".to_string(),
            );
        }

        let distinct_raw: HashSet<&str> = failing.iter().map(String::as_str).collect();
        if failing.len() >= 2 && distinct_raw.len() == 1 {
            propose(
                CauseType::RaceCondition,
                0.45,
                "Outcome flips while the failure message stays identical".to_string(),
            );
        } else if distinct_raw.len() > 1 {
            let distinct_masked: HashSet<String> = failing
                .iter()
                .map(|t| NUMERIC_LITERAL.replace_all(t, "#").into_owned())
                .collect();
            if distinct_masked.len() == 1 {
                propose(
                    CauseType::RandomData,
                    0.6,
                    "Failure messages differ only in numeric values".to_string(),
                );
            }
        }
    }

    if let Some(cv) = duration_variation(occurrences) {
        if cv > 0.5 {
            propose(
                CauseType::Timing,
                0.3 + 0.3 * cv.min(1.0),
                format!("Run durations vary widely (coefficient of variation {cv:.2})"),
            );
        }
    }

    let mut causes: Vec<FlakyCause> = found
        .into_iter()
        .map(|(cause_type, (confidence, description))| FlakyCause {
            cause_type,
            confidence,
            description,
        })
        .collect();

    if causes.is_empty() {
        causes.push(FlakyCause {
            cause_type: CauseType::Unknown,
            confidence: 0.1,
            description: "No recognizable failure pattern".to_string(),
        });
    }

    causes.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.cause_type.cmp(&b.cause_type))
    });
    causes
}

/// Coefficient of variation of durations, `None` when undefined.
#[allow(clippy::cast_precision_loss)]
fn duration_variation(occurrences: &[Occurrence<'_>]) -> Option<f64> {
    if occurrences.len() < MIN_RUNS {
        return None;
    }
    let n = occurrences.len() as f64;
    let mean = occurrences.iter().map(|o| o.result.duration as f64).sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = occurrences
        .iter()
        .map(|o| {
            let d = o.result.duration as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some(variance.sqrt() / mean)
}
