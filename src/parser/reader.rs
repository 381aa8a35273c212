//! Define binary readers and writers.

use crate::parser::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Cursor, Read};

/// Binary read utilities over an in-memory buffer.
///
/// Every read names the field it is reading so that a short buffer is
/// reported as [`Error::TruncatedInput`] for that field.
pub trait BlockchainRead: Read {
    /// Number of unread bytes.
    fn remaining(&self) -> usize;

    /// Current offset from the start of the buffer.
    fn offset(&self) -> usize;

    /// Moves the cursor forward by `n` bytes.
    fn advance(&mut self, n: usize);

    /// Reads a Bitcoin Core style VARINT (7 bits per byte, MSB continuation,
    /// each continuation adds one).
    #[inline]
    fn read_varint(&mut self, field: &'static str) -> Result<u64> {
        let mut n: u64 = 0;
        loop {
            let ch_data = self.read_u8(field)?;
            if n > (u64::MAX >> 7) {
                return Err(Error::malformed(field, "varint overflows 64 bits"));
            }
            n = (n << 7) | (ch_data & 0x7F) as u64;
            if ch_data & 0x80 > 0 {
                n = n
                    .checked_add(1)
                    .ok_or_else(|| Error::malformed(field, "varint overflows 64 bits"))?;
            } else {
                break;
            }
        }
        Ok(n)
    }

    /// Reads a CompactSize count as used by the wire format.
    ///
    /// Only the shortest encoding of a value is accepted.
    #[inline]
    fn read_compact_size(&mut self, field: &'static str) -> Result<u64> {
        let flag = self.read_u8(field)?;
        let (n, min) = match flag {
            0xFD => {
                let mut arr = [0u8; 2];
                self.read_array(&mut arr, field)?;
                (LittleEndian::read_u16(&arr) as u64, 0xFD)
            }
            0xFE => {
                let mut arr = [0u8; 4];
                self.read_array(&mut arr, field)?;
                (LittleEndian::read_u32(&arr) as u64, 0x1_0000)
            }
            0xFF => {
                let mut arr = [0u8; 8];
                self.read_array(&mut arr, field)?;
                (LittleEndian::read_u64(&arr), 0x1_0000_0000)
            }
            n => return Ok(n as u64),
        };
        if n < min {
            return Err(Error::malformed(
                field,
                format!("non-canonical compact size {n}"),
            ));
        }
        Ok(n)
    }

    #[inline]
    fn read_array(&mut self, buf: &mut [u8], field: &'static str) -> Result<()> {
        self.read_exact(buf).map_err(|e| Error::from_io(field, e))
    }

    #[inline]
    fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        let mut slice = [0u8; 1];
        self.read_array(&mut slice, field)?;
        Ok(slice[0])
    }

    #[inline]
    fn read_u256(&mut self, field: &'static str) -> Result<[u8; 32]> {
        let mut arr = [0u8; 32];
        self.read_array(&mut arr, field)?;
        Ok(arr)
    }

    #[inline]
    fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        let mut arr = [0u8; 4];
        self.read_array(&mut arr, field)?;
        Ok(LittleEndian::read_u32(&arr))
    }

    #[inline]
    fn read_i32(&mut self, field: &'static str) -> Result<i32> {
        let mut arr = [0u8; 4];
        self.read_array(&mut arr, field)?;
        Ok(LittleEndian::read_i32(&arr))
    }

    #[inline]
    fn read_i64(&mut self, field: &'static str) -> Result<i64> {
        let mut arr = [0u8; 8];
        self.read_array(&mut arr, field)?;
        Ok(LittleEndian::read_i64(&arr))
    }

    /// Reads `count` bytes, refusing lengths larger than what is left.
    #[inline]
    fn read_u8_vec(&mut self, count: u64, field: &'static str) -> Result<Vec<u8>> {
        let len = self.check_len(count, field)?;
        let mut arr = vec![0u8; len];
        self.read_array(&mut arr, field)?;
        Ok(arr)
    }

    /// Reads a CompactSize length followed by that many bytes.
    #[inline]
    fn read_var_bytes(&mut self, field: &'static str) -> Result<Vec<u8>> {
        let len = self.read_compact_size(field)?;
        self.read_u8_vec(len, field)
    }

    /// Skips a CompactSize length followed by that many bytes.
    #[inline]
    fn skip_var_bytes(&mut self, field: &'static str) -> Result<()> {
        let len = self.read_compact_size(field)?;
        let len = self.check_len(len, field)?;
        self.advance(len);
        Ok(())
    }

    /// Skips an opaque fixed-size field.
    #[inline]
    fn skip(&mut self, n: usize, field: &'static str) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::TruncatedInput { field });
        }
        self.advance(n);
        Ok(())
    }

    /// Checks that a declared byte length fits in the unread part.
    #[inline]
    fn check_len(&self, len: u64, field: &'static str) -> Result<usize> {
        let remaining = self.remaining();
        if len > remaining as u64 {
            return Err(Error::malformed(
                field,
                format!("declared {len} bytes, {remaining} remaining"),
            ));
        }
        Ok(len as usize)
    }

    /// Checks that `count` items of at least `min_size` bytes each could fit
    /// in the unread part. Returns the count as `usize`.
    #[inline]
    fn check_count(&self, count: u64, min_size: usize, field: &'static str) -> Result<usize> {
        let remaining = self.remaining() as u64;
        match count.checked_mul(min_size as u64) {
            Some(needed) if needed <= remaining => Ok(count as usize),
            _ => Err(Error::malformed(
                field,
                format!("count {count} cannot fit in {remaining} remaining bytes"),
            )),
        }
    }
}

impl<T: AsRef<[u8]>> BlockchainRead for Cursor<T> {
    #[inline]
    fn remaining(&self) -> usize {
        self.get_ref()
            .as_ref()
            .len()
            .saturating_sub(self.position() as usize)
    }

    #[inline]
    fn offset(&self) -> usize {
        self.position() as usize
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.set_position(self.position() + n as u64);
    }
}

/// Binary write utilities for the storage format.
pub trait BlockchainWrite {
    fn write_u8(&mut self, v: u8);

    fn write_slice(&mut self, v: &[u8]);

    /// Inverse of [`BlockchainRead::read_varint`].
    fn write_varint(&mut self, mut n: u64) {
        let mut tmp = [0u8; 10];
        let mut len = 0;
        loop {
            tmp[len] = (n & 0x7F) as u8 | if len > 0 { 0x80 } else { 0x00 };
            if n <= 0x7F {
                break;
            }
            n = (n >> 7) - 1;
            len += 1;
        }
        for i in (0..=len).rev() {
            self.write_u8(tmp[i]);
        }
    }

    /// VARINT length followed by the bytes.
    fn write_var_bytes(&mut self, v: &[u8]) {
        self.write_varint(v.len() as u64);
        self.write_slice(v);
    }
}

impl BlockchainWrite for Vec<u8> {
    #[inline]
    fn write_u8(&mut self, v: u8) {
        self.push(v);
    }

    #[inline]
    fn write_slice(&mut self, v: &[u8]) {
        self.extend_from_slice(v);
    }
}

/// Maps signed integers onto unsigned ones so small magnitudes stay short.
#[inline]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_matches_core_encoding() {
        // values and encodings from Bitcoin Core's serialize_tests
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x00]),
            (0x1234, &[0xa3, 0x34]),
            (0xffff, &[0x82, 0xfe, 0x7f]),
            (0x123456, &[0xc7, 0xe7, 0x56]),
        ];
        for (value, bytes) in cases {
            let mut buf = Vec::new();
            buf.write_varint(*value);
            assert_eq!(&buf[..], *bytes, "encoding of {value:#x}");
            let mut r = Cursor::new(&buf[..]);
            assert_eq!(r.read_varint("test").unwrap(), *value);
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn test_varint_u64_max() {
        let mut buf = Vec::new();
        buf.write_varint(u64::MAX);
        let mut r = Cursor::new(&buf[..]);
        assert_eq!(r.read_varint("test").unwrap(), u64::MAX);
    }

    #[test]
    fn test_varint_overflow_is_malformed() {
        let buf = [0xffu8; 12];
        let mut r = Cursor::new(&buf[..]);
        assert!(matches!(
            r.read_varint("test"),
            Err(Error::MalformedField { .. })
        ));
    }

    #[test]
    fn test_compact_size() {
        let buf = [0xfc, 0xfd, 0x00, 0x01, 0xfe, 0x00, 0x00, 0x01, 0x00];
        let mut r = Cursor::new(&buf[..]);
        assert_eq!(r.read_compact_size("a").unwrap(), 0xfc);
        assert_eq!(r.read_compact_size("b").unwrap(), 0x100);
        assert_eq!(r.read_compact_size("c").unwrap(), 0x10000);
        assert!(matches!(
            r.read_compact_size("d"),
            Err(Error::TruncatedInput { field: "d" })
        ));
    }

    #[test]
    fn test_non_canonical_compact_size() {
        let cases: &[&[u8]] = &[
            &[0xfd, 0x01, 0x00],
            &[0xfd, 0xfc, 0x00],
            &[0xfe, 0xff, 0xff, 0x00, 0x00],
            &[0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00],
        ];
        for buf in cases {
            let mut r = Cursor::new(*buf);
            assert!(
                matches!(
                    r.read_compact_size("count"),
                    Err(Error::MalformedField { field: "count", .. })
                ),
                "encoding {buf:02x?}"
            );
        }
        let mut r = Cursor::new(&[0xfd, 0xfd, 0x00][..]);
        assert_eq!(r.read_compact_size("count").unwrap(), 0xfd);
    }

    #[test]
    fn test_oversized_length_is_malformed() {
        let buf = [0x05, 0x01, 0x02];
        let mut r = Cursor::new(&buf[..]);
        assert!(matches!(
            r.read_var_bytes("script"),
            Err(Error::MalformedField { field: "script", .. })
        ));
    }

    #[test]
    fn test_skip_past_end_is_truncated() {
        let buf = [0u8; 8];
        let mut r = Cursor::new(&buf[..]);
        r.skip(4, "a").unwrap();
        assert_eq!(r.offset(), 4);
        assert!(matches!(
            r.skip(9, "b"),
            Err(Error::TruncatedInput { field: "b" })
        ));
    }

    #[test]
    fn test_check_count() {
        let buf = [0u8; 82];
        let r = Cursor::new(&buf[..]);
        assert_eq!(r.check_count(2, 41, "inputs").unwrap(), 2);
        assert!(r.check_count(3, 41, "inputs").is_err());
        assert!(r.check_count(u64::MAX, 41, "inputs").is_err());
    }

    #[test]
    fn test_zigzag() {
        for v in [0i64, 1, -1, 1715323245, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
    }
}
