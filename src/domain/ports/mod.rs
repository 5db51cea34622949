//! Port trait definitions (Hexagonal Architecture)
//!
//! - TestingClient: contract to the external testing-analysis server
//!
//! The reconciliation core depends only on these traits, never on a
//! concrete transport.

pub mod testing_client;

pub use testing_client::{CoverageEventHandler, TestEventHandler, TestingClient};
