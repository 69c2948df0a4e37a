pub mod base_client;
pub mod config;
pub mod highlevel;
#[cfg(test)]
pub mod mock;
pub mod poll;
pub mod types;

pub use base_client::{BaseClient, HttpBaseClient};
pub use config::{BasicAuth, ClientConfig, CustomHeader};
pub use highlevel::HighLevelClient;
pub use poll::{poll_until, try_until, PollOutcome};
