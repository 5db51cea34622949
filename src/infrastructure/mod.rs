//! Infrastructure layer module
//!
//! Adapters around the core:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Testing client implementations
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod client;
pub mod config;
pub mod logging;
