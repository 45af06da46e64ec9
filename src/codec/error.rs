//! Framing errors

use thiserror::Error;

/// Malformed or truncated frame bytes.
///
/// None of these are recoverable mid-stream: once a frame fails to parse
/// the offset of the next frame cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("frame declares {declared} body bytes but only {available} are available")]
    Truncated { declared: u64, available: usize },
    #[error("varint length prefix overflows 64 bits")]
    VarintOverflow,
    #[error("frame body of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u64, max: usize },
    #[error("malformed {frame} frame: {reason}")]
    Malformed {
        frame: &'static str,
        reason: &'static str,
    },
    #[error("{frame} frame carries invalid UTF-8")]
    InvalidUtf8 { frame: &'static str },
}
