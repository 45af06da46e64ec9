//! Server configuration
//!
//! Defaults, optionally overlaid by a JSON file named in
//! `BUFFER_SERVER_CONFIG`, then by individual `BUFFER_SERVER_*` variables.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::DEFAULT_MAX_FRAME_LEN;

pub const ENV_CONFIG_FILE: &str = "BUFFER_SERVER_CONFIG";
pub const ENV_ADDR: &str = "BUFFER_SERVER_ADDR";
pub const ENV_REACTORS: &str = "BUFFER_SERVER_REACTORS";
pub const ENV_QUEUE_CAPACITY: &str = "BUFFER_SERVER_QUEUE_CAPACITY";
pub const ENV_REPLAY_BATCH: &str = "BUFFER_SERVER_REPLAY_BATCH";
pub const ENV_MAX_FRAME: &str = "BUFFER_SERVER_MAX_FRAME";
pub const ENV_LOG: &str = "BUFFER_SERVER_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Runtime knobs for the buffer server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Address the acceptor binds to
    pub listen_addr: SocketAddr,
    /// Number of reactor threads sharing the connections
    pub reactor_threads: usize,
    /// Bound on each consumer's outbound queue, in entries
    pub consumer_queue_capacity: usize,
    /// Entries copied out of the log per catch-up step
    pub replay_batch_size: usize,
    /// Largest accepted frame body
    pub max_frame_len: usize,
    /// Initial read buffer per connection
    pub read_buffer_size: usize,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9080)),
            reactor_threads: 2,
            consumer_queue_capacity: 1024,
            replay_batch_size: 256,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_buffer_size: 8 * 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Config bound to an ephemeral loopback port
    pub fn ephemeral() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        }
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the config from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match env::var(ENV_CONFIG_FILE) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|var| env::var(var).ok())
    }

    /// Apply `BUFFER_SERVER_*` overrides looked up through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ADDR) {
            self.listen_addr = parse_var(ENV_ADDR, value)?;
        }
        if let Some(value) = lookup(ENV_REACTORS) {
            self.reactor_threads = parse_var(ENV_REACTORS, value)?;
        }
        if let Some(value) = lookup(ENV_QUEUE_CAPACITY) {
            self.consumer_queue_capacity = parse_var(ENV_QUEUE_CAPACITY, value)?;
        }
        if let Some(value) = lookup(ENV_REPLAY_BATCH) {
            self.replay_batch_size = parse_var(ENV_REPLAY_BATCH, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_FRAME) {
            self.max_frame_len = parse_var(ENV_MAX_FRAME, value)?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reactor_threads == 0 {
            return Err(ConfigError::Zero("reactorThreads"));
        }
        if self.consumer_queue_capacity == 0 {
            return Err(ConfigError::Zero("consumerQueueCapacity"));
        }
        if self.replay_batch_size == 0 {
            return Err(ConfigError::Zero("replayBatchSize"));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Zero("maxFrameLen"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
