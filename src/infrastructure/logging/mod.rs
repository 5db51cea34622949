//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - pretty or JSON output on stderr
//! - optional daily-rotated JSON log files

pub mod logger;

pub use logger::{LogFormat, LoggerImpl};
