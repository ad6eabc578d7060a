//! Variable-length Integer Framing
//!
//! Length prefixes inside binlog blobs use LEB128-style varints so short
//! strings and small row counts cost one byte instead of eight. Decoding is
//! fallible: a truncated or over-long varint is a corruption signal, not a
//! panic.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Encode an unsigned integer as a varint.
pub fn encode_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint-encoded unsigned integer.
pub fn decode_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(Error::Truncated("varint".to_string()));
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Ok(value);
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::Encode("varint exceeds 64 bits".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(value: u64) -> u64 {
        let mut buf = BytesMut::new();
        encode_u64(&mut buf, value);
        decode_u64(&mut buf.freeze()).unwrap()
    }

    #[test]
    fn test_small_values_one_byte() {
        let mut buf = BytesMut::new();
        encode_u64(&mut buf, 127);
        assert_eq!(buf.len(), 1);
        assert_eq!(roundtrip(127), 127);
    }

    #[test]
    fn test_boundary_values() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u64::MAX] {
            assert_eq!(roundtrip(value), value);
        }
    }

    #[test]
    fn test_truncated_input_errors() {
        let mut buf = BytesMut::new();
        encode_u64(&mut buf, u64::MAX);
        let truncated = buf.freeze().slice(0..3);
        assert!(decode_u64(&mut truncated.clone()).is_err());
    }
}
