//! Wire frames: `[tag:u8][len:varint][body]`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::handshake::{Ack, ControlRequest, PartitionFilter, PublishRequest, SubscribeRequest};
use super::varint::{put_varint, read_varint, varint_len};
use super::FramingError;
use crate::types::{Record, StreamId, WindowId};

pub const TAG_RESET: u8 = 0x01;
pub const TAG_BEGIN_WINDOW: u8 = 0x02;
pub const TAG_END_WINDOW: u8 = 0x03;
pub const TAG_PAYLOAD: u8 = 0x04;
pub const TAG_PUBLISH: u8 = 0x10;
pub const TAG_SUBSCRIBE: u8 = 0x11;
pub const TAG_CONTROL: u8 = 0x12;
pub const TAG_PURGE: u8 = 0x13;
pub const TAG_WIPE: u8 = 0x14;
pub const TAG_ACK: u8 = 0x15;

/// Default upper bound on a frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Everything that travels over a buffer server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Record(Record),
    Publish(PublishRequest),
    Subscribe(SubscribeRequest),
    Control(ControlRequest),
    Purge { threshold: WindowId },
    /// Administrative wipe of a stream's log.
    Wipe,
    Ack(Ack),
}

fn known_tag(tag: u8) -> bool {
    matches!(tag, TAG_RESET..=TAG_PAYLOAD | TAG_PUBLISH..=TAG_ACK)
}

fn malformed(frame: &'static str, reason: &'static str) -> FramingError {
    FramingError::Malformed { frame, reason }
}

fn string_len(s: &str) -> usize {
    varint_len(s.len() as u64) + s.len()
}

fn optional_string_len(s: Option<&str>) -> usize {
    1 + s.map_or(0, string_len)
}

fn put_string(dst: &mut BytesMut, s: &str) {
    put_varint(dst, s.len() as u64);
    dst.put_slice(s.as_bytes());
}

fn put_optional_string(dst: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            dst.put_u8(1);
            put_string(dst, s);
        }
        None => dst.put_u8(0),
    }
}

impl Frame {
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Record(Record::Reset { .. }) => TAG_RESET,
            Frame::Record(Record::BeginWindow { .. }) => TAG_BEGIN_WINDOW,
            Frame::Record(Record::EndWindow { .. }) => TAG_END_WINDOW,
            Frame::Record(Record::Payload { .. }) => TAG_PAYLOAD,
            Frame::Publish(_) => TAG_PUBLISH,
            Frame::Subscribe(_) => TAG_SUBSCRIBE,
            Frame::Control(_) => TAG_CONTROL,
            Frame::Purge { .. } => TAG_PURGE,
            Frame::Wipe => TAG_WIPE,
            Frame::Ack(_) => TAG_ACK,
        }
    }

    pub fn name(&self) -> &'static str {
        tag_name(self.tag())
    }

    fn body_len(&self) -> usize {
        match self {
            Frame::Record(Record::Reset { bootstrap, .. }) => 4 + bootstrap.len(),
            Frame::Record(Record::BeginWindow { .. } | Record::EndWindow { .. }) => 4,
            Frame::Record(Record::Payload { data, .. }) => 4 + data.len(),
            Frame::Publish(req) => {
                string_len(req.stream_id.as_str()) + optional_string_len(req.identity.as_deref())
            }
            Frame::Subscribe(req) => {
                let filter = match &req.partitions {
                    Some(f) => 1 + 4 + varint_len(f.keys.len() as u64) + 4 * f.keys.len(),
                    None => 1,
                };
                string_len(req.stream_id.as_str())
                    + 8
                    + optional_string_len(req.identity.as_deref())
                    + filter
            }
            Frame::Control(req) => string_len(req.stream_id.as_str()),
            Frame::Purge { .. } => 8,
            Frame::Wipe => 0,
            Frame::Ack(ack) => ack.marker.len(),
        }
    }

    /// Appends the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let body_len = self.body_len();
        dst.reserve(1 + varint_len(body_len as u64) + body_len);
        dst.put_u8(self.tag());
        put_varint(dst, body_len as u64);
        let start = dst.len();

        match self {
            Frame::Record(Record::Reset { epoch, bootstrap }) => {
                dst.put_u32(*epoch);
                dst.put_slice(bootstrap);
            }
            Frame::Record(Record::BeginWindow { sequence } | Record::EndWindow { sequence }) => {
                dst.put_u32(*sequence);
            }
            Frame::Record(Record::Payload {
                partition_key,
                data,
            }) => {
                dst.put_u32(*partition_key);
                dst.put_slice(data);
            }
            Frame::Publish(req) => {
                put_string(dst, req.stream_id.as_str());
                put_optional_string(dst, req.identity.as_deref());
            }
            Frame::Subscribe(req) => {
                put_string(dst, req.stream_id.as_str());
                dst.put_u64(req.threshold.as_u64());
                put_optional_string(dst, req.identity.as_deref());
                match &req.partitions {
                    Some(filter) => {
                        dst.put_u8(1);
                        dst.put_u32(filter.mask);
                        put_varint(dst, filter.keys.len() as u64);
                        for key in &filter.keys {
                            dst.put_u32(*key);
                        }
                    }
                    None => dst.put_u8(0),
                }
            }
            Frame::Control(req) => put_string(dst, req.stream_id.as_str()),
            Frame::Purge { threshold } => dst.put_u64(threshold.as_u64()),
            Frame::Wipe => {}
            Frame::Ack(ack) => dst.put_slice(&ack.marker),
        }

        debug_assert_eq!(dst.len() - start, body_len);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes exactly one complete frame.
    pub fn decode(data: Bytes) -> Result<Frame, FramingError> {
        let tag = *data.first().ok_or(malformed("frame", "missing tag"))?;
        if !known_tag(tag) {
            return Err(FramingError::UnknownTag(tag));
        }
        let (declared, prefix) =
            read_varint(&data[1..])?.ok_or(malformed("frame", "truncated length prefix"))?;
        let available = data.len() - 1 - prefix;
        if declared > available as u64 {
            return Err(FramingError::Truncated {
                declared,
                available,
            });
        }
        if declared < available as u64 {
            return Err(malformed("frame", "trailing bytes after body"));
        }
        decode_body(tag, data.slice(1 + prefix..))
    }
}

pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_RESET => "reset",
        TAG_BEGIN_WINDOW => "begin_window",
        TAG_END_WINDOW => "end_window",
        TAG_PAYLOAD => "payload",
        TAG_PUBLISH => "publish",
        TAG_SUBSCRIBE => "subscribe",
        TAG_CONTROL => "control",
        TAG_PURGE => "purge",
        TAG_WIPE => "wipe",
        TAG_ACK => "ack",
        _ => "unknown",
    }
}

/// Size of the first complete frame in `data`.
///
/// Returns `None` while more bytes are needed. Unknown tags and oversized
/// bodies fail as soon as the header is visible, before the body arrives.
pub fn frame_size(data: &[u8], max_frame_len: usize) -> Result<Option<usize>, FramingError> {
    let Some(&tag) = data.first() else {
        return Ok(None);
    };
    if !known_tag(tag) {
        return Err(FramingError::UnknownTag(tag));
    }
    let Some((len, prefix)) = read_varint(&data[1..])? else {
        return Ok(None);
    };
    if len > max_frame_len as u64 {
        return Err(FramingError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }
    let total = 1 + prefix + len as usize;
    Ok((data.len() >= total).then_some(total))
}

/// Bounds-checked reader over a frame body.
struct BodyReader {
    frame: &'static str,
    data: Bytes,
}

impl BodyReader {
    fn need(&self, n: usize) -> Result<(), FramingError> {
        if self.data.remaining() < n {
            return Err(malformed(self.frame, "body too short"));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, FramingError> {
        self.need(1)?;
        Ok(self.data.get_u8())
    }

    fn u32(&mut self) -> Result<u32, FramingError> {
        self.need(4)?;
        Ok(self.data.get_u32())
    }

    fn u64(&mut self) -> Result<u64, FramingError> {
        self.need(8)?;
        Ok(self.data.get_u64())
    }

    fn varint(&mut self) -> Result<u64, FramingError> {
        let (value, n) =
            read_varint(&self.data)?.ok_or(malformed(self.frame, "truncated varint"))?;
        self.data.advance(n);
        Ok(value)
    }

    fn string(&mut self) -> Result<String, FramingError> {
        let len = self.varint()?;
        if len > self.data.remaining() as u64 {
            return Err(malformed(self.frame, "string overruns body"));
        }
        let raw = self.data.split_to(len as usize);
        String::from_utf8(raw.to_vec()).map_err(|_| FramingError::InvalidUtf8 { frame: self.frame })
    }

    fn optional_string(&mut self) -> Result<Option<String>, FramingError> {
        match self.u8()? {
            0 => Ok(None),
            1 => self.string().map(Some),
            _ => Err(malformed(self.frame, "bad option flag")),
        }
    }

    fn rest(&mut self) -> Bytes {
        std::mem::take(&mut self.data)
    }

    fn finish(self) -> Result<(), FramingError> {
        if self.data.has_remaining() {
            return Err(malformed(self.frame, "trailing bytes in body"));
        }
        Ok(())
    }
}

fn decode_body(tag: u8, body: Bytes) -> Result<Frame, FramingError> {
    let mut r = BodyReader {
        frame: tag_name(tag),
        data: body,
    };

    let frame = match tag {
        TAG_RESET => {
            let epoch = r.u32()?;
            Frame::Record(Record::Reset {
                epoch,
                bootstrap: r.rest(),
            })
        }
        TAG_BEGIN_WINDOW => Frame::Record(Record::BeginWindow { sequence: r.u32()? }),
        TAG_END_WINDOW => Frame::Record(Record::EndWindow { sequence: r.u32()? }),
        TAG_PAYLOAD => {
            let partition_key = r.u32()?;
            Frame::Record(Record::Payload {
                partition_key,
                data: r.rest(),
            })
        }
        TAG_PUBLISH => Frame::Publish(PublishRequest {
            stream_id: StreamId::from(r.string()?),
            identity: r.optional_string()?,
        }),
        TAG_SUBSCRIBE => {
            let stream_id = StreamId::from(r.string()?);
            let threshold = WindowId::from_raw(r.u64()?);
            let identity = r.optional_string()?;
            let partitions = match r.u8()? {
                0 => None,
                1 => {
                    let mask = r.u32()?;
                    let count = r.varint()?;
                    if count.saturating_mul(4) > r.data.remaining() as u64 {
                        return Err(malformed("subscribe", "partition list overruns body"));
                    }
                    let mut keys = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        keys.push(r.u32()?);
                    }
                    Some(PartitionFilter { mask, keys })
                }
                _ => return Err(malformed("subscribe", "bad option flag")),
            };
            Frame::Subscribe(SubscribeRequest {
                stream_id,
                threshold,
                identity,
                partitions,
            })
        }
        TAG_CONTROL => Frame::Control(ControlRequest {
            stream_id: StreamId::from(r.string()?),
        }),
        TAG_PURGE => Frame::Purge {
            threshold: WindowId::from_raw(r.u64()?),
        },
        TAG_WIPE => Frame::Wipe,
        TAG_ACK => Frame::Ack(Ack { marker: r.rest() }),
        other => return Err(FramingError::UnknownTag(other)),
    };

    r.finish()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let bytes = Frame::Record(Record::payload(7, &b"abc"[..])).to_bytes();
        assert_eq!(&bytes[..], &[TAG_PAYLOAD, 7, 0, 0, 0, 7, b'a', b'b', b'c']);
    }

    #[test]
    fn test_subscribe_with_filter_decodes() {
        let req = SubscribeRequest::new("orders", WindowId::new(3, 50))
            .with_identity("op-7")
            .with_partitions(PartitionFilter::new(0xf, [1, 3]));
        let frame = Frame::Subscribe(req);
        assert_eq!(Frame::decode(frame.to_bytes()).unwrap(), frame);
    }

    #[test]
    fn test_reset_keeps_bootstrap_bytes() {
        let frame = Frame::Record(Record::Reset {
            epoch: 0x7afe_babe,
            bootstrap: Bytes::from_static(&[0, 0, 0, 0xfa]),
        });
        let decoded = Frame::decode(frame.to_bytes()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(
            Frame::decode(Bytes::from_static(&[0x7f, 0])),
            Err(FramingError::UnknownTag(0x7f))
        );
        assert_eq!(
            frame_size(&[0x7f], DEFAULT_MAX_FRAME_LEN),
            Err(FramingError::UnknownTag(0x7f))
        );
    }

    #[test]
    fn test_declared_length_beyond_buffer() {
        let err = Frame::decode(Bytes::from_static(&[TAG_BEGIN_WINDOW, 4, 0, 0])).unwrap_err();
        assert_eq!(
            err,
            FramingError::Truncated {
                declared: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_short_body_is_malformed() {
        let err = Frame::decode(Bytes::from_static(&[TAG_END_WINDOW, 2, 0, 1])).unwrap_err();
        assert!(matches!(err, FramingError::Malformed { frame: "end_window", .. }));
    }

    #[test]
    fn test_frame_size_waits_for_body() {
        let bytes = Frame::Record(Record::begin(9)).to_bytes();
        assert_eq!(frame_size(&bytes[..1], 1024).unwrap(), None);
        assert_eq!(frame_size(&bytes[..bytes.len() - 1], 1024).unwrap(), None);
        assert_eq!(frame_size(&bytes, 1024).unwrap(), Some(bytes.len()));

        let mut two = BytesMut::from(&bytes[..]);
        Frame::Record(Record::end(9)).encode(&mut two);
        assert_eq!(frame_size(&two, 1024).unwrap(), Some(bytes.len()));
    }

    #[test]
    fn test_oversized_frame_rejected_from_header() {
        let mut header = BytesMut::new();
        header.put_u8(TAG_PAYLOAD);
        put_varint(&mut header, 4096);
        assert_eq!(
            frame_size(&header, 1024),
            Err(FramingError::FrameTooLarge { len: 4096, max: 1024 })
        );
    }

    #[test]
    fn test_invalid_utf8_stream_id() {
        let data = Bytes::from_static(&[TAG_CONTROL, 3, 2, 0xff, 0xfe]);
        assert_eq!(
            Frame::decode(data),
            Err(FramingError::InvalidUtf8 { frame: "control" })
        );
    }
}
