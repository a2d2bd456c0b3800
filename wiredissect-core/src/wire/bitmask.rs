//! Bitmask-driven optional fields.
//!
//! A presence mask says which optional fixed-size fields follow. The order in
//! which set bits are consumed and the size of each field are protocol
//! configuration, given as a slice of [`PresenceBinding`]s.

use crate::error::OutOfBounds;
use crate::schema::FieldDescriptor;

use super::ByteCursor;

/// Binds one mask bit to the fixed-size field it announces.
#[derive(Debug, Clone, Copy)]
pub struct PresenceBinding {
    /// Bit position in the mask (0 = least significant).
    pub bit: u8,
    /// Field size in bytes.
    pub size: usize,
    pub descriptor: &'static FieldDescriptor,
}

impl PresenceBinding {
    pub const fn new(bit: u8, size: usize, descriptor: &'static FieldDescriptor) -> Self {
        Self {
            bit,
            size,
            descriptor,
        }
    }

    #[inline]
    fn is_set(&self, mask: u64) -> bool {
        self.bit < 64 && mask & (1u64 << self.bit) != 0
    }
}

/// An optional field that the mask announced and the buffer contained.
#[derive(Debug, Clone, Copy)]
pub struct PresentField<'a, 'b> {
    pub binding: &'b PresenceBinding,
    /// Absolute offset of the first byte.
    pub offset: usize,
    pub bytes: &'a [u8],
}

/// An announced field that ran past the end of the region.
#[derive(Debug, Clone, Copy)]
pub struct MissingField<'b> {
    pub binding: &'b PresenceBinding,
    pub error: OutOfBounds,
}

/// Iterator over the fields announced by a mask, in binding order.
///
/// Stops after the first missing field.
pub struct PresenceIter<'a, 'b, 'c> {
    mask: u64,
    bindings: std::slice::Iter<'b, PresenceBinding>,
    cursor: &'c mut ByteCursor<'a>,
    failed: bool,
}

/// Consume the fields announced by `mask` from `cursor`.
pub fn present_fields<'a, 'b, 'c>(
    mask: u64,
    bindings: &'b [PresenceBinding],
    cursor: &'c mut ByteCursor<'a>,
) -> PresenceIter<'a, 'b, 'c> {
    PresenceIter {
        mask,
        bindings: bindings.iter(),
        cursor,
        failed: false,
    }
}

/// Mask bits that no binding accounts for.
pub fn unknown_bits(mask: u64, bindings: &[PresenceBinding]) -> u64 {
    bindings
        .iter()
        .filter(|b| b.bit < 64)
        .fold(mask, |m, b| m & !(1u64 << b.bit))
}

impl<'a, 'b, 'c> Iterator for PresenceIter<'a, 'b, 'c> {
    type Item = Result<PresentField<'a, 'b>, MissingField<'b>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mask = self.mask;
        let binding = self.bindings.by_ref().find(|b| b.is_set(mask))?;
        let offset = self.cursor.position();
        match self.cursor.take(binding.size) {
            Ok(bytes) => Some(Ok(PresentField {
                binding,
                offset,
                bytes,
            })),
            Err(error) => {
                self.failed = true;
                Some(Err(MissingField { binding, error }))
            }
        }
    }
}
