//! Variable-length integer encoding utilities.
//!
//! Postings, positions and dictionary entries are stored as LEB128-style
//! varints: 7 bits per byte with the high bit as continuation flag. Encoding
//! appends into a caller-owned buffer so segment sections can be built without
//! intermediate allocations, and decoding works directly on the byte slice of a
//! loaded or memory-mapped segment.

use std::io::Read;

use byteorder::ReadBytesExt;

use crate::error::{LexisError, Result};

/// Maximum number of bytes a varint-encoded u64 can occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` to `buf` using variable-length encoding.
///
/// Returns the number of bytes written.
pub fn encode_u64_into(value: u64, buf: &mut Vec<u8>) -> usize {
    let mut val = value;
    let mut written = 0;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80;
        }

        buf.push(byte);
        written += 1;

        if val == 0 {
            return written;
        }
    }
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    encode_u64_into(value, &mut bytes);
    bytes
}

/// Decode a u64 value from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return Err(LexisError::other("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(LexisError::other("Incomplete VarInt"))
}

/// Decode a u64 value at `*pos` in `bytes`, advancing `pos` past it.
pub fn read_u64_at(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let tail = bytes
        .get(*pos..)
        .ok_or_else(|| LexisError::other("VarInt read past end of buffer"))?;
    let (value, len) = decode_u64(tail)?;
    *pos += len;
    Ok(value)
}

/// Decode a u32 value at `*pos` in `bytes`, advancing `pos` past it.
pub fn read_u32_at(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let value = read_u64_at(bytes, pos)?;
    u32::try_from(value).map_err(|_| LexisError::other("VarInt overflow"))
}

/// Read a variable-length encoded u64 from a reader.
///
/// Returns the value together with the raw bytes consumed so that callers
/// maintaining a checksum can feed them in.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<(u64, Vec<u8>)> {
    let mut raw = Vec::with_capacity(4);

    loop {
        let byte = reader.read_u8()?;
        raw.push(byte);

        if byte & 0x80 == 0 {
            break;
        }
        if raw.len() >= MAX_VARINT_LEN {
            return Err(LexisError::other("VarInt overflow"));
        }
    }

    let (value, _) = decode_u64(&raw)?;
    Ok((value, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_u64() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for &value in &test_values {
            let encoded = encode_u64(value);
            let (decoded, bytes_read) = decode_u64(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
        }
    }

    #[test]
    fn test_read_at_advances_position() {
        let mut buf = Vec::new();
        encode_u64_into(300, &mut buf);
        encode_u64_into(5, &mut buf);

        let mut pos = 0;
        assert_eq!(read_u64_at(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);
        assert_eq!(read_u32_at(&buf, &mut pos).unwrap(), 5);
        assert_eq!(pos, 3);
        assert!(read_u64_at(&buf, &mut pos).is_err());
    }

    #[test]
    fn test_read_from_reader() {
        let buf = encode_u64(123456789012345);
        let mut cursor = Cursor::new(buf.clone());
        let (value, raw) = read_u64(&mut cursor).unwrap();

        assert_eq!(value, 123456789012345);
        assert_eq!(raw, buf);
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u64(0).len(), 1);
        assert_eq!(encode_u64(127).len(), 1);
        assert_eq!(encode_u64(128).len(), 2);
        assert_eq!(encode_u64(16384).len(), 3);
        assert_eq!(encode_u64(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_incomplete_varint() {
        let incomplete = vec![0x80];
        assert!(decode_u64(&incomplete).is_err());
    }

    #[test]
    fn test_u32_overflow() {
        let buf = encode_u64(u64::from(u32::MAX) + 1);
        let mut pos = 0;
        assert!(read_u32_at(&buf, &mut pos).is_err());
    }
}
