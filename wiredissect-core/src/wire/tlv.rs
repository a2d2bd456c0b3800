//! Type-length-value iteration with per-tag header layouts.
//!
//! Most TLV encodings use one header shape for every tag, but some vendor
//! formats move the length field for particular tags (an enterprise number
//! in front of it, a wider length, or no length at all for padding). A
//! [`TlvScheme`] therefore carries a default [`TlvHeader`] plus explicit
//! per-tag overrides.

use std::ops::Range;

use crate::error::OutOfBounds;

use super::{ByteCursor, Endian};

/// Header layout of one TLV entry, relative to the entry start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvHeader {
    /// Offset of the length field from the start of the entry.
    pub length_at: usize,
    /// Width of the length field; 0 means the entry has no value.
    pub length_width: usize,
    /// Total header size. The value starts right after it.
    pub header_len: usize,
}

impl TlvHeader {
    /// `{type, length}` with the length directly after the type.
    pub const fn standard(type_width: usize, length_width: usize) -> Self {
        Self {
            length_at: type_width,
            length_width,
            header_len: type_width + length_width,
        }
    }

    /// A bare tag with no length and no value (padding, end markers).
    pub const fn tag_only(type_width: usize) -> Self {
        Self {
            length_at: type_width,
            length_width: 0,
            header_len: type_width,
        }
    }

    /// `{type, prefix[prefix_len], length}`: the length follows `prefix_len`
    /// bytes of tag-specific header data.
    pub const fn shifted(type_width: usize, prefix_len: usize, length_width: usize) -> Self {
        Self {
            length_at: type_width + prefix_len,
            length_width,
            header_len: type_width + prefix_len + length_width,
        }
    }
}

/// How a protocol lays out its TLV entries.
#[derive(Debug, Clone, Copy)]
pub struct TlvScheme {
    /// Width of the type field, read first for every entry.
    pub type_width: usize,
    /// Byte order of the type and length fields.
    pub endian: Endian,
    /// Header used when no override matches.
    pub default: TlvHeader,
    /// Per-tag header layouts.
    pub overrides: &'static [(u32, TlvHeader)],
    /// Tag that ends the region; the terminator entry itself is yielded.
    pub terminator: Option<u32>,
}

impl TlvScheme {
    /// Header layout for `tag`.
    pub fn header_for(&self, tag: u32) -> TlvHeader {
        self.overrides
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, h)| *h)
            .unwrap_or(self.default)
    }
}

/// One decoded TLV entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvEntry<'a> {
    pub tag: u32,
    pub header: TlvHeader,
    /// Absolute offset of the entry's first byte.
    pub offset: usize,
    /// The full header, type field included.
    pub header_bytes: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> TlvEntry<'a> {
    /// Absolute byte range of the whole entry.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.value_offset() + self.value.len()
    }

    /// Absolute offset of the first value byte.
    pub fn value_offset(&self) -> usize {
        self.offset + self.header.header_len
    }

    /// Header bytes between the type and the length field.
    pub fn header_prefix(&self, type_width: usize) -> &'a [u8] {
        let end = self.header.length_at.min(self.header_bytes.len());
        &self.header_bytes[type_width.min(end)..end]
    }
}

/// Iterator over the TLV entries of a region.
///
/// Every entry consumes at least its header, so zero-length values cannot
/// stall the iteration. A malformed entry is yielded as an error once and
/// ends the iteration.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    cursor: ByteCursor<'a>,
    scheme: TlvScheme,
    max_entries: usize,
    done: bool,
}

impl<'a> TlvIter<'a> {
    /// Iterate the entries between the cursor position and its limit.
    pub fn new(cursor: ByteCursor<'a>, scheme: TlvScheme) -> Self {
        debug_assert!(scheme.type_width >= 1);
        Self {
            cursor,
            scheme,
            max_entries: usize::MAX,
            done: false,
        }
    }

    /// Stop after `max` entries.
    pub fn with_limit(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Whether the region was consumed to its end.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_empty()
    }

    fn read_entry(&mut self) -> Result<TlvEntry<'a>, OutOfBounds> {
        let offset = self.cursor.position();
        let mut probe = self.cursor;
        let tag = probe.read_uint(self.scheme.type_width, self.scheme.endian)? as u32;

        let header = self.scheme.header_for(tag);
        let header_len = header.header_len.max(self.scheme.type_width);
        let length = if header.length_width == 0 {
            0
        } else {
            let raw = self.cursor.slice(offset + header.length_at, header.length_width)?;
            let mut len_cursor = ByteCursor::new(raw);
            len_cursor.read_uint(header.length_width, self.scheme.endian)? as usize
        };

        let header_bytes = self.cursor.take(header_len)?;
        let value = match self.cursor.take(length) {
            Ok(value) => value,
            Err(err) => {
                // Leave the cursor on the entry so position() points at it.
                self.cursor.seek(offset).ok();
                return Err(err);
            }
        };

        if self.scheme.terminator == Some(tag) {
            self.done = true;
        }

        Ok(TlvEntry {
            tag,
            header,
            offset,
            header_bytes,
            value,
        })
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<TlvEntry<'a>, OutOfBounds>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor.is_empty() || self.max_entries == 0 {
            return None;
        }
        self.max_entries -= 1;
        match self.read_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
