//! Testing client implementations

pub mod mock_client;

pub use mock_client::MockTestingClient;
