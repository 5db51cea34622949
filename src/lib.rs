//! Testlens - test result reconciliation and caching core
//!
//! Testlens sits between an editor and an external testing server. It keeps
//! the canonical table of test results, a bounded run history, per-file
//! coverage with a trend, and a flaky-test classification, and notifies
//! views whenever any of them change.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors, notification fan-out and
//!   the `TestingClient` port
//! - **Service Layer** (`services`): result store, coverage aggregator,
//!   flaky analyzer, event ingestion and the client coordinator
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging
//!   and client implementations
//! - **CLI Layer** (`cli`): offline command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use testlens::{Config, MockTestingClient, ResultStore, TestCoordinator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(ResultStore::new());
//!     let client = Arc::new(MockTestingClient::new());
//!     let coordinator = TestCoordinator::new(client, store, &Config::default());
//!     coordinator.run(Default::default(), &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ConsumerError, InsightError, InsightResult};
pub use domain::fanout::{Fanout, Subscription};
pub use domain::models::{
    ClientEvent, Config, CoverageGap, CoverageSnapshot, CoverageSummary, FlakyTest, RunOptions,
    TestResult, TestRunHistory, TestStatus,
};
pub use domain::ports::TestingClient;
pub use infrastructure::client::MockTestingClient;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CoverageAggregator, EventIngestor, FlakyAnalyzer, ResultStore, TestCoordinator,
};
