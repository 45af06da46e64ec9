use bytes::Bytes;
use tokio::net::{TcpStream, ToSocketAddrs};

use super::{ClientResult, CLIENT_READ_BUFFER};
use crate::codec::{Frame, PublishRequest, DEFAULT_MAX_FRAME_LEN};
use crate::framed::FramedStream;
use crate::types::Record;

/// Producer connection. Records are buffered until [`Publisher::flush`].
pub struct Publisher {
    io: FramedStream,
}

impl Publisher {
    pub async fn connect(addr: impl ToSocketAddrs, stream_id: &str) -> ClientResult<Self> {
        Self::connect_with(addr, PublishRequest::new(stream_id)).await
    }

    pub async fn connect_with(
        addr: impl ToSocketAddrs,
        request: PublishRequest,
    ) -> ClientResult<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let mut io = FramedStream::new(socket, CLIENT_READ_BUFFER, DEFAULT_MAX_FRAME_LEN);
        io.send(&Frame::Publish(request)).await?;
        Ok(Self { io })
    }

    pub fn queue(&mut self, record: Record) {
        self.io.queue(&Frame::Record(record));
    }

    /// Queues a whole window: begin, one payload per item, end.
    pub fn queue_window<I>(&mut self, sequence: u32, payloads: I)
    where
        I: IntoIterator<Item = (u32, Bytes)>,
    {
        self.queue(Record::begin(sequence));
        for (partition_key, data) in payloads {
            self.queue(Record::payload(partition_key, data));
        }
        self.queue(Record::end(sequence));
    }

    pub async fn send(&mut self, record: Record) -> ClientResult<()> {
        self.queue(record);
        self.flush().await
    }

    pub async fn flush(&mut self) -> ClientResult<()> {
        Ok(self.io.flush().await?)
    }

    /// Flushes and closes the connection.
    pub async fn close(mut self) -> ClientResult<()> {
        Ok(self.io.shutdown().await?)
    }
}
