//! Bounds-checked reader over an immutable byte buffer.

use crate::error::OutOfBounds;

/// Byte order of a multi-byte integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Network byte order (most significant byte first).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// Position-tracking reader over a byte buffer.
///
/// All positions are absolute offsets into the buffer the cursor was created
/// over, including for views produced by [`bounded`](Self::bounded). A cursor
/// may only read below its `limit`; every read checks the bound first and
/// reports [`OutOfBounds`] instead of truncating.
///
/// The cursor is `Copy`, so a caller can snapshot it to try a read and
/// discard the advanced copy.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor over the whole buffer, positioned at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len(),
        }
    }

    /// The underlying buffer (ignores the limit).
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Current absolute position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset one past the last readable byte.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left between the position and the limit.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    /// Bytes readable from `offset` to the limit; zero past the limit.
    #[inline]
    pub fn remaining_from(&self, offset: usize) -> usize {
        self.limit.saturating_sub(offset)
    }

    /// True when nothing is left to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// A view over the next `len` bytes, sharing absolute positions.
    ///
    /// The returned cursor starts at the current position and cannot read past
    /// `position + len`. `self` does not advance.
    pub fn bounded(&self, len: usize) -> Result<ByteCursor<'a>, OutOfBounds> {
        self.check(self.pos, len)?;
        Ok(ByteCursor {
            data: self.data,
            pos: self.pos,
            limit: self.pos + len,
        })
    }

    /// A view ending at `end`, or at the current limit if that comes first.
    pub fn clamped(&self, end: usize) -> ByteCursor<'a> {
        ByteCursor {
            data: self.data,
            pos: self.pos,
            limit: end.min(self.limit),
        }
    }

    /// Move to an absolute position no further than the limit.
    pub fn seek(&mut self, pos: usize) -> Result<(), OutOfBounds> {
        if pos > self.limit {
            return Err(OutOfBounds {
                offset: pos,
                needed: 0,
                available: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    #[inline]
    fn check(&self, offset: usize, needed: usize) -> Result<(), OutOfBounds> {
        let available = self.remaining_from(offset);
        if offset > self.limit || needed > available {
            return Err(OutOfBounds {
                offset,
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Borrow `len` bytes at an absolute offset without moving.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], OutOfBounds> {
        self.check(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], OutOfBounds> {
        let bytes = self.slice(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Borrow everything up to the limit and advance to it.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let start = self.pos.min(self.limit);
        self.pos = self.limit.max(self.pos);
        &self.data[start..self.limit]
    }

    /// Advance by `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), OutOfBounds> {
        self.check(self.pos, len)?;
        self.pos += len;
        Ok(())
    }

    /// Byte at an absolute offset.
    pub fn peek_at(&self, offset: usize) -> Result<u8, OutOfBounds> {
        self.check(offset, 1)?;
        Ok(self.data[offset])
    }

    /// Next byte without advancing.
    pub fn peek_u8(&self) -> Result<u8, OutOfBounds> {
        self.peek_at(self.pos)
    }

    /// Read an unsigned integer of `width` bytes (1..=8).
    pub fn read_uint(&mut self, width: usize, endian: Endian) -> Result<u64, OutOfBounds> {
        debug_assert!((1..=8).contains(&width), "integer width {width} out of range");
        let bytes = self.take(width.min(8))?;
        let value = match endian {
            Endian::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
            Endian::Little => bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64),
        };
        Ok(value)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, OutOfBounds> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    #[inline]
    pub fn read_u16(&mut self, endian: Endian) -> Result<u16, OutOfBounds> {
        self.read_uint(2, endian).map(|v| v as u16)
    }

    #[inline]
    pub fn read_u24(&mut self, endian: Endian) -> Result<u32, OutOfBounds> {
        self.read_uint(3, endian).map(|v| v as u32)
    }

    #[inline]
    pub fn read_u32(&mut self, endian: Endian) -> Result<u32, OutOfBounds> {
        self.read_uint(4, endian).map(|v| v as u32)
    }

    #[inline]
    pub fn read_u48(&mut self, endian: Endian) -> Result<u64, OutOfBounds> {
        self.read_uint(6, endian)
    }

    #[inline]
    pub fn read_u64(&mut self, endian: Endian) -> Result<u64, OutOfBounds> {
        self.read_uint(8, endian)
    }

    /// Read `bit_count` bits starting at an absolute bit offset.
    ///
    /// Bits are numbered most significant first within each byte, so bit
    /// offset 0 is the top bit of byte 0. Counts above 32 are clamped to 32.
    /// The cursor does not move.
    pub fn read_bits(&self, bit_offset: usize, bit_count: u32) -> Result<u32, OutOfBounds> {
        let bit_count = bit_count.min(32) as usize;
        if bit_count == 0 {
            return Ok(0);
        }
        let first = bit_offset / 8;
        let last = (bit_offset + bit_count - 1) / 8;
        let bytes = self.slice(first, last - first + 1)?;

        let acc = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let trailing = bytes.len() * 8 - (bit_offset % 8) - bit_count;
        let mask = (1u64 << bit_count) - 1;
        Ok(((acc >> trailing) & mask) as u32)
    }

    /// Read a NUL-terminated string of at most `max` bytes including the NUL.
    ///
    /// Returns the bytes before the terminator and advances past it.
    pub fn read_cstr(&mut self, max: usize) -> Result<&'a [u8], OutOfBounds> {
        let window = max.min(self.remaining());
        let region = self.slice(self.pos, window)?;
        match region.iter().position(|&b| b == 0) {
            Some(nul) => {
                self.pos += nul + 1;
                Ok(&region[..nul])
            }
            None => Err(OutOfBounds {
                offset: self.pos,
                needed: window + 1,
                available: window,
            }),
        }
    }

    /// Read a length-prefixed byte run; the prefix is `width` bytes wide.
    pub fn read_prefixed(&mut self, width: usize, endian: Endian) -> Result<&'a [u8], OutOfBounds> {
        let mut probe = *self;
        let len = probe.read_uint(width, endian)? as usize;
        let bytes = probe.take(len)?;
        *self = probe;
        Ok(bytes)
    }
}
