//! Low-level wire primitives.
//!
//! - [`ByteCursor`] - bounds-checked reads at absolute positions
//! - [`varint`] - continuation-bit variable-length integers
//! - [`tlv`] - type-length-value iteration with per-tag header layouts
//! - [`bitmask`] - presence-bitmask optional fields
//! - [`checksum`] - checksum functions and non-fatal verification

pub mod bitmask;
pub mod checksum;
mod cursor;
pub mod tlv;
pub mod varint;

pub use bitmask::{present_fields, unknown_bits, MissingField, PresenceBinding, PresentField};
pub use checksum::{ChecksumAlgorithm, ChecksumVerdict};
pub use cursor::{ByteCursor, Endian};
pub use tlv::{TlvEntry, TlvHeader, TlvIter, TlvScheme};
pub use varint::{count_vle_bytes, encode_vle, read_vle, MAX_VLE_VALUE};
