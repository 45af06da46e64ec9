use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use super::{ClientError, ClientResult, CLIENT_READ_BUFFER};
use crate::codec::{AckMarker, ControlRequest, Frame, DEFAULT_MAX_FRAME_LEN};
use crate::framed::FramedStream;
use crate::types::{StreamId, WindowId};

/// Issues administrative requests. Each request uses its own connection.
#[derive(Debug, Clone)]
pub struct Controller<A> {
    addr: A,
}

impl<A: ToSocketAddrs + Clone> Controller<A> {
    pub fn new(addr: A) -> Self {
        Self { addr }
    }

    /// Purges every window at or below `threshold`; returns once applied.
    pub async fn purge(&self, stream_id: &str, threshold: WindowId) -> ClientResult<AckMarker> {
        self.request(stream_id, Frame::Purge { threshold }).await
    }

    /// Wipes the stream's log.
    pub async fn reset(&self, stream_id: &str) -> ClientResult<AckMarker> {
        self.request(stream_id, Frame::Wipe).await
    }

    async fn request(&self, stream_id: &str, request: Frame) -> ClientResult<AckMarker> {
        let socket = TcpStream::connect(self.addr.clone()).await?;
        let mut io = FramedStream::new(socket, CLIENT_READ_BUFFER, DEFAULT_MAX_FRAME_LEN);
        io.queue(&Frame::Control(ControlRequest {
            stream_id: StreamId::from(stream_id),
        }));
        io.send(&request).await?;

        let marker = match io.read_frame().await? {
            Some(Frame::Ack(ack)) => ack.decode_marker()?,
            Some(other) => return Err(ClientError::Unexpected(other.name())),
            None => return Err(ClientError::Closed),
        };
        debug!(stream = stream_id, op = ?marker.op, removed = marker.removed, "request acknowledged");
        Ok(marker)
    }
}
