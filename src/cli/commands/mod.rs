//! CLI command implementations.

pub mod coverage;
pub mod flaky;
pub mod replay;
