//! Client side of the three session roles
//!
//! Thin wrappers over [`FramedStream`] used by the orchestration layer and
//! by the integration tests.

mod controller;
mod publisher;
mod subscriber;

use thiserror::Error;

use crate::session::SessionError;

pub use controller::Controller;
pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Default per-connection read buffer for clients
pub(crate) const CLIENT_READ_BUFFER: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] SessionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server closed the connection")]
    Closed,
    #[error("unexpected {0} frame from server")]
    Unexpected(&'static str),
    #[error("invalid completion marker: {0}")]
    Marker(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
