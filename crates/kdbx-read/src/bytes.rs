//! Byte-level readers over an in-memory buffer
//!
//! `ByteReader` decodes fixed-width integers at explicit offsets without any
//! internal state; `CursorReader` layers a read position on top for the
//! tag-length-value loops of the KDBX headers. Reading past the end of the
//! buffer is always a hard `TruncatedInput` error, never a clamped read.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Stateless reader with explicit-offset integer accessors.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
}

macro_rules! fixed_read {
    ($name:ident, $ty:ty, $width:expr, $endian:ty, $method:ident) => {
        pub fn $name(&self, offset: usize) -> Result<$ty> {
            let bytes = self.checked(offset, $width)?;
            Ok(<$endian>::$method(bytes))
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Constant-structure byte equality: false whenever lengths differ or
    /// any byte differs.
    pub fn equals(a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b.iter()).all(|(x, y)| x == y)
    }

    fn checked(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(width).ok_or(Error::TruncatedInput {
            needed: width,
            remaining: 0,
        })?;
        if end > self.bytes.len() {
            return Err(Error::TruncatedInput {
                needed: width,
                remaining: self.bytes.len().saturating_sub(offset),
            });
        }
        Ok(&self.bytes[offset..end])
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.checked(offset, 1)?[0])
    }

    pub fn read_i8(&self, offset: usize) -> Result<i8> {
        Ok(self.checked(offset, 1)?[0] as i8)
    }

    fixed_read!(read_i16_be, i16, 2, BigEndian, read_i16);
    fixed_read!(read_i16_le, i16, 2, LittleEndian, read_i16);
    fixed_read!(read_u16_be, u16, 2, BigEndian, read_u16);
    fixed_read!(read_u16_le, u16, 2, LittleEndian, read_u16);
    fixed_read!(read_i32_be, i32, 4, BigEndian, read_i32);
    fixed_read!(read_i32_le, i32, 4, LittleEndian, read_i32);
    fixed_read!(read_u32_be, u32, 4, BigEndian, read_u32);
    fixed_read!(read_u32_le, u32, 4, LittleEndian, read_u32);
    fixed_read!(read_i64_be, i64, 8, BigEndian, read_i64);
    fixed_read!(read_i64_le, i64, 8, LittleEndian, read_i64);
    fixed_read!(read_u64_be, u64, 8, BigEndian, read_u64);
    fixed_read!(read_u64_le, u64, 8, LittleEndian, read_u64);

    /// `slice()` with no bounds returns the whole buffer; `slice(a, b)`
    /// returns exactly the half-open range `[a, b)`.
    pub fn slice(&self, start: Option<usize>, end: Option<usize>) -> &'a [u8] {
        let start = start.unwrap_or(0).min(self.bytes.len());
        let end = end.unwrap_or(self.bytes.len()).min(self.bytes.len());
        if start >= end {
            return &[];
        }
        &self.bytes[start..end]
    }
}

/// Position-tracking reader used for the sequential header loops.
#[derive(Debug)]
pub struct CursorReader<'a> {
    reader: ByteReader<'a>,
    offset: usize,
}

impl<'a> CursorReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(bytes),
            offset: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    /// Advances the position by `length`; fails if fewer bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let bytes = self.reader.checked(self.offset, length)?;
        self.offset += length;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8(self.offset)?;
        self.offset += 1;
        Ok(value)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let value = self.reader.read_u16_le(self.offset)?;
        self.offset += 2;
        Ok(value)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let value = self.reader.read_u32_le(self.offset)?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        let value = self.reader.read_i32_le(self.offset)?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let value = self.reader.read_u64_le(self.offset)?;
        self.offset += 8;
        Ok(value)
    }

    /// Everything from the current position to the end, without advancing.
    pub fn remaining(&self) -> &'a [u8] {
        self.reader.slice(Some(self.offset), None)
    }

    /// The exact byte range consumed so far.
    pub fn processed(&self) -> &'a [u8] {
        self.reader.slice(Some(0), Some(self.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads_little_and_big_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let reader = ByteReader::new(&data);

        assert_eq!(reader.read_u8(0).unwrap(), 0x01);
        assert_eq!(reader.read_u16_le(0).unwrap(), 0x0201);
        assert_eq!(reader.read_u16_be(0).unwrap(), 0x0102);
        assert_eq!(reader.read_u32_le(0).unwrap(), 0x0403_0201);
        assert_eq!(reader.read_u32_be(0).unwrap(), 0x0102_0304);
        assert_eq!(reader.read_u64_le(0).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(reader.read_u64_be(0).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn signed_reads_sign_extend() {
        let data = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let reader = ByteReader::new(&data);

        assert_eq!(reader.read_i8(0).unwrap(), -1);
        assert_eq!(reader.read_i16_le(0).unwrap(), -1);
        assert_eq!(reader.read_i32_be(0).unwrap(), -1);
        assert_eq!(reader.read_i64_le(0).unwrap(), -1);
    }

    #[test]
    fn u64_keeps_full_unsigned_range() {
        let data = u64::MAX.to_le_bytes();
        let reader = ByteReader::new(&data);
        assert_eq!(reader.read_u64_le(0).unwrap(), u64::MAX);

        let data = (1u64 << 63).to_le_bytes();
        let reader = ByteReader::new(&data);
        assert_eq!(reader.read_u64_le(0).unwrap(), 1u64 << 63);
    }

    #[test]
    fn reading_past_the_end_is_fatal() {
        let data = [0x01, 0x02];
        let reader = ByteReader::new(&data);
        assert!(matches!(
            reader.read_u32_le(0),
            Err(Error::TruncatedInput { .. })
        ));
        assert!(matches!(
            reader.read_u8(2),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn equals_rejects_length_and_content_differences() {
        assert!(ByteReader::equals(&[1, 2, 3], &[1, 2, 3]));
        assert!(!ByteReader::equals(&[1, 2, 3], &[1, 2]));
        assert!(!ByteReader::equals(&[1, 2, 3], &[1, 2, 4]));
        assert!(ByteReader::equals(&[], &[]));
    }

    #[test]
    fn slice_semantics() {
        let data = [1u8, 2, 3, 4, 5];
        let reader = ByteReader::new(&data);
        assert_eq!(reader.slice(None, None), &data);
        assert_eq!(reader.slice(Some(1), Some(3)), &[2, 3]);
        assert_eq!(reader.slice(Some(4), Some(99)), &[5]);
        assert_eq!(reader.slice(Some(3), Some(3)), &[] as &[u8]);
    }

    #[test]
    fn cursor_tracks_position_and_processed_range() {
        let data = [0x0a, 0x01, 0x00, 0x00, 0x00, 0xde, 0xad];
        let mut cursor = CursorReader::new(&data);

        assert_eq!(cursor.read_u8().unwrap(), 0x0a);
        assert_eq!(cursor.read_u32_le().unwrap(), 1);
        assert_eq!(cursor.position(), 5);
        assert_eq!(cursor.processed(), &data[..5]);
        assert_eq!(cursor.remaining(), &[0xde, 0xad]);
        assert_eq!(cursor.read_bytes(2).unwrap(), &[0xde, 0xad]);
        assert!(matches!(
            cursor.read_bytes(1),
            Err(Error::TruncatedInput { .. })
        ));
    }
}
