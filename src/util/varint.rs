//! Variable-length integer encoding utilities.
//!
//! Postings and position lists are delta-encoded and written as LEB128-style
//! varints: seven payload bits per byte, high bit set on every byte but the last.

use crate::error::{QuarryError, Result};

/// Append `value` to `buf` using variable-length encoding.
pub fn encode_u64(buf: &mut Vec<u8>, value: u64) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Decode a varint starting at `*pos`, advancing `*pos` past it.
pub fn decode_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    while let Some(&byte) = bytes.get(*pos) {
        *pos += 1;

        if shift >= 64 {
            return Err(QuarryError::index("varint overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }

    Err(QuarryError::index("incomplete varint"))
}

/// Decode a varint that must fit in a `u32`.
pub fn decode_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let value = decode_u64(bytes, pos)?;
    u32::try_from(value).map_err(|_| QuarryError::index(format!("varint {value} exceeds u32")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_sequence() {
        let values = [0, 1, 127, 128, 255, 300, 16384, u32::MAX as u64, u64::MAX];
        let mut buf = Vec::new();
        for &v in &values {
            encode_u64(&mut buf, v);
        }

        let mut pos = 0;
        for &v in &values {
            assert_eq!(decode_u64(&buf, &mut pos).unwrap(), v);
        }
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_encoding_efficiency() {
        let mut small = Vec::new();
        encode_u64(&mut small, 100);
        assert_eq!(small.len(), 1);

        let mut large = Vec::new();
        encode_u64(&mut large, u64::MAX);
        assert!(large.len() <= 10);
    }

    #[test]
    fn test_incomplete_varint() {
        let mut pos = 0;
        assert!(decode_u64(&[0x80], &mut pos).is_err());
    }

    #[test]
    fn test_overflow() {
        let mut pos = 0;
        assert!(decode_u64(&[0xFF; 20], &mut pos).is_err());
    }

    #[test]
    fn test_u32_bounds() {
        let mut buf = Vec::new();
        encode_u64(&mut buf, u32::MAX as u64 + 1);
        let mut pos = 0;
        assert!(decode_u32(&buf, &mut pos).is_err());
    }
}
