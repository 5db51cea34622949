//! Service layer
//!
//! Reconciliation of server-reported test state:
//! - ResultStore: canonical results, indices and bounded run history
//! - CoverageAggregator: per-file coverage, totals, gaps and trend
//! - FlakyAnalyzer: flaky classification over retained history
//! - EventIngestor: applies server events to the store and aggregator
//! - TestCoordinator: bounded, cancellable calls to the testing server

pub mod coverage_aggregator;
pub mod event_ingestor;
pub mod flaky_analyzer;
pub mod result_store;
pub mod test_coordinator;

pub use coverage_aggregator::CoverageAggregator;
pub use event_ingestor::{EventIngestor, IngestionHandle};
pub use flaky_analyzer::FlakyAnalyzer;
pub use result_store::ResultStore;
pub use test_coordinator::{FlakyDetectionReport, TestCoordinator};
