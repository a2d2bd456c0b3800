//! Continuation-bit variable-length integers (1, 2 or 4 bytes).
//!
//! The top bit of the first byte says whether a second byte follows; if the
//! second byte's top bit is also set, the encoding is four bytes long. The
//! value is the concatenation of the low seven bits of every byte, most
//! significant chunk first, which gives a 28-bit range.
//!
//! ```text
//! 0xxxxxxx                                      7 bits
//! 1xxxxxxx 0xxxxxxx                            14 bits
//! 1xxxxxxx 1xxxxxxx ?xxxxxxx ?xxxxxxx          28 bits
//! ```

use smallvec::SmallVec;

use crate::error::{DecodeError, OutOfBounds};

use super::ByteCursor;

/// Largest value the four-byte form can carry.
pub const MAX_VLE_VALUE: u32 = 0x0FFF_FFFF;

const CONTINUATION: u8 = 0x80;
const CHUNK_MASK: u8 = 0x7F;

/// Number of bytes the varint at the cursor occupies.
///
/// Looks at the continuation bits only, so callers can size a field before
/// (or without) decoding it. Needs the second byte only when the first one
/// announces it.
pub fn count_vle_bytes(cursor: &ByteCursor<'_>) -> Result<usize, OutOfBounds> {
    let pos = cursor.position();
    if cursor.peek_at(pos)? & CONTINUATION == 0 {
        return Ok(1);
    }
    if cursor.peek_at(pos + 1)? & CONTINUATION == 0 {
        return Ok(2);
    }
    Ok(4)
}

/// Decode the varint at the cursor, returning `(value, byte_count)`.
///
/// The byte count is determined first; if the continuation bits promise more
/// bytes than remain, nothing is consumed.
pub fn read_vle(cursor: &mut ByteCursor<'_>) -> Result<(u32, usize), OutOfBounds> {
    let count = count_vle_bytes(cursor)?;
    let bytes = cursor.take(count)?;
    let value = bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | (b & CHUNK_MASK) as u32);
    Ok((value, count))
}

/// Bytes needed to encode `value`.
pub fn encoded_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        _ => 4,
    }
}

/// Encode `value` in the shortest form.
pub fn encode_vle(value: u32) -> Result<SmallVec<[u8; 4]>, DecodeError> {
    if value > MAX_VLE_VALUE {
        return Err(DecodeError::VarintOverflow { value });
    }
    let len = encoded_len(value);
    let mut out = SmallVec::new();
    for i in (0..len).rev() {
        out.push(((value >> (7 * i)) as u8) & CHUNK_MASK);
    }
    if len > 1 {
        out[0] |= CONTINUATION;
    }
    if len > 2 {
        out[1] |= CONTINUATION;
    }
    Ok(out)
}
