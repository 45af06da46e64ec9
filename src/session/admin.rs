//! Administrator sessions: one purge or wipe, one ack, then close

use std::sync::Arc;

use tracing::{debug, info};

use super::{SessionError, SessionResult};
use crate::codec::{Ack, AckMarker, AdminOp, ControlRequest, Frame};
use crate::framed::FramedStream;
use crate::stream::StreamRegistry;
use crate::types::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    Connecting,
    Awaiting,
    Closed,
}

pub struct AdminSession {
    stream_id: StreamId,
    registry: Arc<StreamRegistry>,
    state: AdminState,
}

impl AdminSession {
    pub fn new(request: ControlRequest, registry: Arc<StreamRegistry>) -> Self {
        Self {
            stream_id: request.stream_id,
            registry,
            state: AdminState::Connecting,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn state(&self) -> AdminState {
        self.state
    }

    pub async fn run(mut self, io: &mut FramedStream) -> SessionResult<()> {
        self.state = AdminState::Awaiting;
        let Some(frame) = io.read_frame().await? else {
            debug!("administrator closed without a request");
            self.state = AdminState::Closed;
            return Ok(());
        };

        let ack = self.apply(frame)?;
        io.send(&Frame::Ack(ack)).await?;
        io.shutdown().await?;
        self.state = AdminState::Closed;
        Ok(())
    }

    /// Applies one administrative request and builds its acknowledgment.
    ///
    /// A stream with no log is left alone; the request still succeeds.
    pub fn apply(&self, frame: Frame) -> SessionResult<Ack> {
        let channel = self.registry.get(self.stream_id.as_str());
        let (op, removed) = match frame {
            Frame::Purge { threshold } => (
                AdminOp::Purge,
                channel.map_or(0, |c| c.purge(threshold)),
            ),
            Frame::Wipe => (AdminOp::Reset, channel.map_or(0, |c| c.reset())),
            other => {
                return Err(SessionError::UnexpectedFrame {
                    expected: "purge or wipe",
                    found: other.name(),
                })
            }
        };
        if removed == 0 {
            info!(op = ?op, "nothing to remove");
        }
        Ok(AckMarker::new(op, self.stream_id.clone(), removed as u64).into_ack()?)
    }
}
