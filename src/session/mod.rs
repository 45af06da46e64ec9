//! Connection sessions
//!
//! The first frame on a connection picks its role. Each role is a session
//! value with an explicit state enum; the reactor drives every connection
//! through [`Session::run`] regardless of role.
//!
//! ```text
//! Producer:       Connecting -> Streaming -> Closed
//! Consumer:       Attaching -> {Pending, Replaying, Live} -> Closed
//! Administrator:  Connecting -> Awaiting -> Closed
//! ```

mod admin;
mod consumer;
mod producer;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::codec::{Frame, FramingError};
use crate::config::BrokerConfig;
use crate::framed::FramedStream;
use crate::stream::StreamRegistry;
use crate::types::StreamId;

pub use admin::{AdminSession, AdminState};
pub use consumer::{ConsumerSession, ConsumerState};
pub use producer::{ProducerSession, ProducerState};

/// Errors that end a session. None of them affect other sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("expected {expected} frame, got {found}")]
    UnexpectedFrame {
        expected: &'static str,
        found: &'static str,
    },
    #[error("connection closed")]
    Closed,
    #[error("failed to encode completion marker: {0}")]
    Marker(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Role a connection takes after its handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
    Administrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What every session needs from the server
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<StreamRegistry>,
    pub consumer_queue_capacity: usize,
    pub replay_batch_size: usize,
}

impl SessionContext {
    pub fn new(registry: Arc<StreamRegistry>, config: &BrokerConfig) -> Self {
        Self {
            registry,
            consumer_queue_capacity: config.consumer_queue_capacity,
            replay_batch_size: config.replay_batch_size,
        }
    }
}

/// A connection after its handshake, tagged by role.
pub enum Session {
    Producer(ProducerSession),
    Consumer(ConsumerSession),
    Administrator(AdminSession),
}

impl Session {
    /// Builds the session named by a connection's first frame.
    pub fn accept(handshake: Frame, ctx: &SessionContext) -> SessionResult<Self> {
        match handshake {
            Frame::Publish(request) => Ok(Session::Producer(ProducerSession::new(
                request,
                &ctx.registry,
            ))),
            Frame::Subscribe(request) => Ok(Session::Consumer(ConsumerSession::new(request, ctx))),
            Frame::Control(request) => Ok(Session::Administrator(AdminSession::new(
                request,
                Arc::clone(&ctx.registry),
            ))),
            other => Err(SessionError::UnexpectedFrame {
                expected: "handshake",
                found: other.name(),
            }),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Session::Producer(_) => Role::Producer,
            Session::Consumer(_) => Role::Consumer,
            Session::Administrator(_) => Role::Administrator,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        match self {
            Session::Producer(s) => s.stream_id(),
            Session::Consumer(s) => s.stream_id(),
            Session::Administrator(s) => s.stream_id(),
        }
    }

    /// Drives the session until it closes.
    pub async fn run(self, io: &mut FramedStream) -> SessionResult<()> {
        match self {
            Session::Producer(s) => s.run(io).await,
            Session::Consumer(s) => s.run(io).await,
            Session::Administrator(s) => s.run(io).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ControlRequest, PublishRequest, SubscribeRequest};
    use crate::types::{Record, WindowId};

    fn ctx() -> SessionContext {
        SessionContext::new(Arc::new(StreamRegistry::new()), &BrokerConfig::default())
    }

    #[test]
    fn test_handshake_selects_role() {
        let ctx = ctx();
        let producer = Session::accept(Frame::Publish(PublishRequest::new("s")), &ctx).unwrap();
        assert_eq!(producer.role(), Role::Producer);

        let consumer = Session::accept(
            Frame::Subscribe(SubscribeRequest::new("s", WindowId::ZERO)),
            &ctx,
        )
        .unwrap();
        assert_eq!(consumer.role(), Role::Consumer);

        let admin = Session::accept(
            Frame::Control(ControlRequest {
                stream_id: StreamId::from("s"),
            }),
            &ctx,
        )
        .unwrap();
        assert_eq!(admin.role(), Role::Administrator);
        assert_eq!(admin.stream_id().as_str(), "s");
    }

    #[test]
    fn test_record_before_handshake_rejected() {
        let err = Session::accept(Frame::Record(Record::begin(0)), &ctx())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SessionError::UnexpectedFrame {
                expected: "handshake",
                found: "begin_window"
            }
        ));
    }

    #[test]
    fn test_admin_handshake_does_not_create_stream() {
        let ctx = ctx();
        let _ = Session::accept(
            Frame::Control(ControlRequest {
                stream_id: StreamId::from("ghost"),
            }),
            &ctx,
        )
        .unwrap();
        assert!(ctx.registry.get("ghost").is_none());
    }
}
