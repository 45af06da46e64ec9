//! Record codec
//!
//! Every frame is a one-byte tag, a varint body length and the body.
//! Records, session handshakes and acknowledgments share the framing so a
//! connection can be read with a single buffer-then-decode loop.

mod error;
mod frame;
mod handshake;
mod varint;

pub use error::FramingError;
pub use frame::{frame_size, tag_name, Frame, DEFAULT_MAX_FRAME_LEN};
pub use handshake::{
    Ack, AckMarker, AdminOp, ControlRequest, PartitionFilter, PublishRequest, SubscribeRequest,
};
pub use varint::{put_varint, read_varint, varint_len, MAX_VARINT_LEN};

use bytes::Bytes;

use crate::types::Record;

/// Encodes a single record frame.
pub fn encode_record(record: &Record) -> Bytes {
    Frame::Record(record.clone()).to_bytes()
}

/// Decodes a single record frame; any other frame kind is malformed here.
pub fn decode_record(data: Bytes) -> Result<Record, FramingError> {
    match Frame::decode(data)? {
        Frame::Record(record) => Ok(record),
        _ => Err(FramingError::Malformed {
            frame: "record",
            reason: "not a record frame",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_contract() {
        let record = Record::payload(3, Bytes::from_static(b"row"));
        assert_eq!(decode_record(encode_record(&record)).unwrap(), record);
    }

    #[test]
    fn test_handshake_is_not_a_record() {
        let bytes = Frame::Wipe.to_bytes();
        assert!(matches!(
            decode_record(bytes),
            Err(FramingError::Malformed { frame: "record", .. })
        ));
    }
}
