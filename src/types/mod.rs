//! Data types for the buffer server
//!
//! This module contains the core data structures shared by the codec,
//! the window log and the sessions.

mod record;
mod stream;
mod window;

pub use record::{LogEntry, Record, RecordKind};
pub use stream::StreamId;
pub use window::WindowId;

/// Result type for top-level broker operations
pub type BrokerResult<T> = Result<T, crate::error::BrokerError>;
