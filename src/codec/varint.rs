//! LEB128 varints used for frame lengths and string prefixes

use bytes::BufMut;

use super::FramingError;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

pub fn put_varint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Reads a varint from the front of `data`.
///
/// Returns `(value, bytes_consumed)`, or `None` when `data` ends before the
/// varint does.
pub fn read_varint(data: &[u8]) -> Result<Option<(u64, usize)>, FramingError> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(FramingError::VarintOverflow);
        }
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_boundaries() {
        for value in [0u64, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = BytesMut::new();
            put_varint(&mut buf, value);
            assert_eq!(buf.len(), varint_len(value));
            assert_eq!(read_varint(&buf).unwrap(), Some((value, buf.len())));
        }
    }

    #[test]
    fn test_incomplete_varint_waits() {
        assert_eq!(read_varint(&[0x80, 0x80]).unwrap(), None);
        assert_eq!(read_varint(&[]).unwrap(), None);
    }

    #[test]
    fn test_overflow_rejected() {
        let bytes = [0xffu8; 11];
        assert_eq!(read_varint(&bytes), Err(FramingError::VarintOverflow));
        let mut ten = [0x80u8; 10];
        ten[9] = 0x02;
        assert_eq!(read_varint(&ten), Err(FramingError::VarintOverflow));
    }
}
