use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::test_coordinator::DETECTION_ITERATIONS;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid detection_iterations: {0}. Must be between 2 and 100")]
    InvalidDetectionIterations(u32),

    #[error("Invalid history_window: {0}. Must be at least 1")]
    InvalidHistoryWindow(usize),

    #[error("Invalid trend_history_size: {0}. Must be at least 1")]
    InvalidTrendHistorySize(usize),

    #[error("Invalid {0} threshold: {1}. Must be between 0 and 100")]
    InvalidThreshold(&'static str, f64),

    #[error("Invalid timeout_ms: {0}. Must be positive")]
    InvalidTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the working directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .testlens/config.yaml
    /// 3. .testlens/local.yaml (optional developer overrides)
    /// 4. Environment variables (TESTLENS_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_in(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `project_dir`.
    pub fn load_in(project_dir: impl AsRef<Path>) -> Result<Config> {
        let base = project_dir.as_ref().join(".testlens");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.join("config.yaml")))
            .merge(Yaml::file(base.join("local.yaml")))
            .merge(Env::prefixed("TESTLENS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if !DETECTION_ITERATIONS.contains(&config.flaky.detection_iterations) {
            return Err(ConfigError::InvalidDetectionIterations(
                config.flaky.detection_iterations,
            ));
        }

        if config.flaky.history_window == 0 {
            return Err(ConfigError::InvalidHistoryWindow(0));
        }

        if config.coverage.trend_history_size == 0 {
            return Err(ConfigError::InvalidTrendHistorySize(0));
        }

        let thresholds = &config.coverage.thresholds;
        for (name, value) in [
            ("lines", thresholds.lines),
            ("branches", thresholds.branches),
            ("functions", thresholds.functions),
            ("statements", thresholds.statements),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold(name, value));
            }
        }

        if config.client.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.flaky.detection_iterations, 10);
        assert_eq!(config.coverage.trend_history_size, 30);
        assert_eq!(config.client.timeout_ms, 30_000);
        assert!((config.coverage.thresholds.lines - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
flaky:
  detection_iterations: 25
coverage:
  trend_history_size: 12
  thresholds:
    branches: 60.0
client:
  timeout_ms: 5000
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.flaky.detection_iterations, 25);
        assert_eq!(config.flaky.history_window, 10);
        assert_eq!(config.coverage.trend_history_size, 12);
        assert!((config.coverage.thresholds.branches - 60.0).abs() < f64::EPSILON);
        assert!((config.coverage.thresholds.lines - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.client.timeout_ms, 5000);
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_detection_iterations() {
        for bad in [0, 1, 101] {
            let mut config = Config::default();
            config.flaky.detection_iterations = bad;
            assert!(matches!(
                ConfigLoader::validate(&config),
                Err(ConfigError::InvalidDetectionIterations(n)) if n == bad
            ));
        }
    }

    #[test]
    fn test_validate_zero_sizes() {
        let mut config = Config::default();
        config.coverage.trend_history_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTrendHistorySize(0))
        ));

        let mut config = Config::default();
        config.flaky.history_window = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidHistoryWindow(0))
        ));

        let mut config = Config::default();
        config.client.timeout_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTimeout(0))
        ));
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = Config::default();
        config.coverage.thresholds.functions = 120.0;

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidThreshold(name, _)) => assert_eq!(name, "functions"),
            other => panic!("Expected InvalidThreshold error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogFormat(format)) => assert_eq!(format, "xml"),
            _ => panic!("Expected InvalidLogFormat error"),
        }
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "client:\n  timeout_ms: 0").unwrap();
        file.flush().unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_hierarchical_merging_with_env() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join(".testlens");
        fs::create_dir_all(&base).unwrap();
        fs::write(
            base.join("config.yaml"),
            "flaky:\n  detection_iterations: 5\nlogging:\n  level: info\n  format: json\n",
        )
        .unwrap();
        fs::write(
            base.join("local.yaml"),
            "flaky:\n  detection_iterations: 15\nlogging:\n  level: debug\n",
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("TESTLENS_CLIENT__TIMEOUT_MS", Some("1500")),
                ("TESTLENS_LOGGING__LEVEL", Some("warn")),
            ],
            || {
                let config = ConfigLoader::load_in(dir.path()).unwrap();

                assert_eq!(config.flaky.detection_iterations, 15, "local.yaml should win");
                assert_eq!(
                    config.logging.format, "json",
                    "Base value should persist when not overridden"
                );
                assert_eq!(config.logging.level, "warn", "Environment should win");
                assert_eq!(config.client.timeout_ms, 1500);
            },
        );
    }
}
