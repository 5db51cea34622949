use serde::{Deserialize, Serialize};

use super::coverage::CoverageThresholds;

/// Main configuration structure for testlens.
///
/// Constructed once and handed to each component; there is no global
/// settings instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Flaky-test detection settings
    #[serde(default)]
    pub flaky: FlakyConfig,

    /// Coverage aggregation settings
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// Testing server client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Flaky detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FlakyConfig {
    /// Runs performed by an on-demand flaky detection (2-100)
    #[serde(default = "default_detection_iterations")]
    pub detection_iterations: u32,

    /// Recent outcomes kept per flaky test
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

const fn default_detection_iterations() -> u32 {
    10
}

const fn default_history_window() -> usize {
    10
}

impl Default for FlakyConfig {
    fn default() -> Self {
        Self {
            detection_iterations: default_detection_iterations(),
            history_window: default_history_window(),
        }
    }
}

/// Coverage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoverageConfig {
    /// Number of trend points retained
    #[serde(default = "default_trend_history_size")]
    pub trend_history_size: usize,

    /// Per-dimension minimum percentages used for gap reports
    #[serde(default)]
    pub thresholds: CoverageThresholds,
}

const fn default_trend_history_size() -> usize {
    30
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            trend_history_size: default_trend_history_size(),
            thresholds: CoverageThresholds::default(),
        }
    }
}

/// Testing server client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Timeout applied to every request in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
