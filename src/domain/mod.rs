//! Domain layer for testlens
//!
//! Core models, the error taxonomy, the notification fan-out and the port
//! to the external testing server.

pub mod errors;
pub mod fanout;
pub mod models;
pub mod ports;

pub use errors::{ConsumerError, InsightError, InsightResult};
pub use fanout::{Fanout, Subscription};
