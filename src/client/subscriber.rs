use tokio::net::{TcpStream, ToSocketAddrs};

use super::{ClientError, ClientResult, CLIENT_READ_BUFFER};
use crate::codec::{Frame, SubscribeRequest, DEFAULT_MAX_FRAME_LEN};
use crate::framed::FramedStream;
use crate::types::{Record, WindowId};

/// Consumer connection yielding records in delivery order.
pub struct Subscriber {
    io: FramedStream,
}

impl Subscriber {
    pub async fn connect(
        addr: impl ToSocketAddrs,
        stream_id: &str,
        threshold: WindowId,
    ) -> ClientResult<Self> {
        Self::connect_with(addr, SubscribeRequest::new(stream_id, threshold)).await
    }

    pub async fn connect_with(
        addr: impl ToSocketAddrs,
        request: SubscribeRequest,
    ) -> ClientResult<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let mut io = FramedStream::new(socket, CLIENT_READ_BUFFER, DEFAULT_MAX_FRAME_LEN);
        io.send(&Frame::Subscribe(request)).await?;
        Ok(Self { io })
    }

    /// Next delivered record, or `None` once the server closes.
    pub async fn next_record(&mut self) -> ClientResult<Option<Record>> {
        match self.io.read_frame().await? {
            Some(Frame::Record(record)) => Ok(Some(record)),
            Some(other) => Err(ClientError::Unexpected(other.name())),
            None => Ok(None),
        }
    }

    pub async fn close(mut self) -> ClientResult<()> {
        Ok(self.io.shutdown().await?)
    }
}
