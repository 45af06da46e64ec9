//! Top-level error type for running the server

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("reactor error: {0}")]
    Reactor(String),
}
