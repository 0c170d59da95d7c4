use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::ParseError;

/// Forward-only reader over a received buffer.
///
/// Every read checks bounds first and fails with [ParseError::OutOfBounds]
/// instead of indexing past the end. Multi-byte values are little-endian on
/// the wire no matter the host.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BinaryCursor { data, offset: 0 }
    }

    /// Index of the next unread byte.
    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// The unread tail of the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Take the next `n` bytes, moving the cursor past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(ParseError::OutOfBounds {
                offset: self.offset,
                wanted: n,
                len: self.data.len(),
            })?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i16_le(&mut self) -> Result<i16, ParseError> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ParseError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Master server ports are the one big-endian field in the family.
    pub fn read_u16_be(&mut self) -> Result<u16, ParseError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, ParseError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ParseError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, ParseError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32_le(&mut self) -> Result<f32, ParseError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Read a null-terminated string.
    ///
    /// The terminator is consumed but not returned. Invalid UTF-8 sequences
    /// are replaced, since server names are free-form bytes in practice.
    pub fn read_cstring(&mut self) -> Result<String, ParseError> {
        let rest = self.remaining();
        let len = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(ParseError::UnterminatedString {
                offset: self.offset,
            })?;
        let string = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.offset += len + 1;
        Ok(string)
    }
}
