//! Window Buffer Server
//!
//! An in-memory broker that sits between the stages of a windowed dataflow
//! pipeline. Producers append framed records to a per-stream window log;
//! consumers replay retained history from a threshold window and then
//! follow live appends; administrators purge or wipe a stream's log.
//!
//! # Features
//!
//! - **Window-indexed retention**: purge by window id, keeping the epoch
//!   context a late consumer needs
//! - **Early and late attach**: consumers may subscribe before or after the
//!   windows they want exist
//! - **Lossless fan-out**: slow consumers fall back to replay instead of
//!   dropping records or blocking producers
//! - **Reactor pool**: each connection is owned by one reactor thread
//!
//! # Modules
//!
//! - `types`: Core data structures (WindowId, StreamId, Record, LogEntry)
//! - `codec`: Frame encoding and decoding
//! - `window_log`: Retention log with purge, reset and cursor resolution
//! - `stream`: Per-stream serialization point and stream registry
//! - `session`: Producer, consumer and administrator state machines
//! - `framed`: Buffered frame I/O over a TCP connection
//! - `server`: Acceptor and reactor threads
//! - `client`: Client side of the three roles
//! - `config`: Server configuration
//! - `telemetry`: Tracing setup
//!
//! # Example
//!
//! ```no_run
//! use window_buffer::{BrokerConfig, BufferServer};
//!
//! #[tokio::main]
//! async fn main() -> window_buffer::BrokerResult<()> {
//!     let server = BufferServer::bind(BrokerConfig::default()).await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod framed;
pub mod server;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod types;
pub mod window_log;

// Re-export commonly used items at crate root
pub use client::{ClientError, Controller, Publisher, Subscriber};
pub use codec::{AckMarker, Frame, FramingError, PartitionFilter, SubscribeRequest};
pub use config::BrokerConfig;
pub use error::BrokerError;
pub use server::BufferServer;
pub use stream::{StreamChannel, StreamRegistry};
pub use types::{BrokerResult, LogEntry, Record, RecordKind, StreamId, WindowId};
pub use window_log::{Cursor, LogStats, WindowLog};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
