//! Seekable byte cursor with absolute offset tracking and little-endian primitives.

use super::BinaryReadError;

/// Cursor over a byte slice. Offsets are absolute within the slice, so a cursor
/// positioned mid-body reports the same offsets the block analyzer records.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Cursor positioned at `pos`. Fails if `pos` lies past the end of `data`.
    pub fn at(data: &'a [u8], pos: usize) -> super::Result<Self> {
        let mut cur = Self::new(data);
        cur.seek(pos)?;
        Ok(cur)
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Move to an absolute offset. Seeking to `len()` (end of input) is allowed.
    pub fn seek(&mut self, pos: usize) -> super::Result<()> {
        if pos > self.data.len() {
            return Err(BinaryReadError::UnexpectedEof { offset: pos });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn peek_u8(&self) -> super::Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.pos })
    }

    pub fn read_u8(&mut self) -> super::Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly n bytes and return a view into the underlying data.
    pub fn read_bytes(&mut self, n: usize) -> super::Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(BinaryReadError::Malformed {
            offset: self.pos,
            msg: "position overflow",
        })?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.pos })?;
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> super::Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_u32_le(&mut self) -> super::Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_le(&mut self) -> super::Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
