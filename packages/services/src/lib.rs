#![deny(unused_crate_dependencies)]
mod health_reporter;
pub mod monitor;
pub mod ports;
pub mod sender;
pub mod types;

pub use health_reporter::{HealthReport, HealthReporter};
pub use monitor::Monitor;
pub use sender::{ResendReconciler, Sender};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Other(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A unit of periodically scheduled work.
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    async fn run(&mut self) -> Result<()>;
}
