//! Framed connection I/O
//!
//! Reads are buffer-then-decode: bytes accumulate in a `BytesMut` and whole
//! frames are split off as they complete. Writes are queue-then-flush:
//! frames are encoded into an outbound buffer and written in one go.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::codec::{frame_size, read_varint, Frame, FramingError};
use crate::session::SessionResult;

pub struct FramedStream {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    peer: Option<SocketAddr>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_frame_len: usize,
}

impl FramedStream {
    pub fn new(stream: TcpStream, read_buffer_size: usize, max_frame_len: usize) -> Self {
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        Self {
            reader,
            writer,
            peer,
            read_buf: BytesMut::with_capacity(read_buffer_size),
            write_buf: BytesMut::new(),
            max_frame_len,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Splits off the next complete frame already in the read buffer.
    pub fn next_buffered(&mut self) -> SessionResult<Option<Frame>> {
        match frame_size(&self.read_buf, self.max_frame_len)? {
            Some(size) => {
                let bytes = self.read_buf.split_to(size).freeze();
                Ok(Some(Frame::decode(bytes)?))
            }
            None => Ok(None),
        }
    }

    /// Next frame from the peer, or `None` on a clean close between frames.
    ///
    /// Cancel safe: a partially received frame stays buffered.
    pub async fn read_frame(&mut self) -> SessionResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.next_buffered()? {
                return Ok(Some(frame));
            }
            if self.reader.read_buf(&mut self.read_buf).await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(truncated_at_eof(&self.read_buf).into());
            }
        }
    }

    /// Resolves once the peer closes its sending side. Anything it sends in
    /// the meantime is discarded.
    pub async fn wait_closed(&mut self) -> SessionResult<()> {
        loop {
            if self.reader.read_buf(&mut self.read_buf).await? == 0 {
                return Ok(());
            }
            self.read_buf.clear();
        }
    }

    pub fn queue(&mut self, frame: &Frame) {
        frame.encode(&mut self.write_buf);
    }

    pub fn queued_bytes(&self) -> usize {
        self.write_buf.len()
    }

    pub async fn flush(&mut self) -> SessionResult<()> {
        if !self.write_buf.is_empty() {
            self.writer.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send(&mut self, frame: &Frame) -> SessionResult<()> {
        self.queue(frame);
        self.flush().await
    }

    /// Flushes, then closes the sending side.
    pub async fn shutdown(&mut self) -> SessionResult<()> {
        self.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn truncated_at_eof(buf: &[u8]) -> FramingError {
    match read_varint(buf.get(1..).unwrap_or_default()) {
        Ok(Some((declared, prefix))) => FramingError::Truncated {
            declared,
            available: buf.len() - 1 - prefix,
        },
        _ => FramingError::Malformed {
            frame: "frame",
            reason: "connection closed inside header",
        },
    }
}
