//! Error types for wiredissect-core.
//!
//! This module provides structured error types for all decoding operations:
//!
//! - [`OutOfBounds`] - A cursor read that would run past the readable region
//! - [`DecodeError`] - Errors that stop decoding of a message
//! - [`enum@Error`] - Crate-level error enum that wraps the others
//!
//! Semantic warnings (bad checksum, unknown opcode, duplicate response) are
//! never errors. They travel as [`Annotation`](crate::protocol::Annotation)
//! values attached to fields and messages.

use thiserror::Error;

/// Main error type for wiredissect-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error decoding a protocol message
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error reading a capture container
    #[error("Capture error: {reason}")]
    Capture { reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A read that would cross the end of the readable region.
///
/// Offsets are positions within the buffer the cursor was created over.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("out of bounds: need {needed} bytes at offset {offset}, {available} available")]
pub struct OutOfBounds {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

impl OutOfBounds {
    /// Attach the name of the field being read.
    pub fn in_field(self, protocol: &'static str, field: &'static str) -> DecodeError {
        DecodeError::TruncatedField {
            protocol,
            field,
            offset: self.offset,
            needed: self.needed,
            available: self.available,
        }
    }
}

/// How an error affects the surrounding decode, following the taxonomy
/// used by the message decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The bytes belong to some other protocol. A multiplexer should try
    /// the next decoder; nothing is logged.
    NotThisProtocol,
    /// The message cannot be walked further; offsets after it are untrusted.
    Structural,
}

/// Errors that stop decoding of a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Magic number does not match any known value for the protocol
    #[error("{protocol}: unknown magic {found:#x}")]
    UnknownMagic { protocol: &'static str, found: u64 },

    /// Declared length exceeds the bytes available in the buffer
    #[error("{protocol}: declared length {declared} exceeds {available} available bytes")]
    LengthOverrun {
        protocol: &'static str,
        declared: usize,
        available: usize,
    },

    /// A fixed-size read ran past the payload boundary
    #[error("{protocol}: truncated {field} at offset {offset} (need {needed} bytes, have {available})")]
    TruncatedField {
        protocol: &'static str,
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Internally inconsistent field value
    #[error("{protocol}: invalid {field}: {reason}")]
    InvalidField {
        protocol: &'static str,
        field: &'static str,
        reason: String,
    },

    /// Value does not fit the variable-length integer scheme
    #[error("varint value {value:#x} exceeds the 28-bit encodable range")]
    VarintOverflow { value: u32 },
}

impl DecodeError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            DecodeError::UnknownMagic { .. } => ErrorClass::NotThisProtocol,
            _ => ErrorClass::Structural,
        }
    }

    /// Whether a multiplexer should try another decoder.
    pub fn is_not_this_protocol(&self) -> bool {
        self.class() == ErrorClass::NotThisProtocol
    }

    /// Byte offset at which decoding stopped, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            DecodeError::TruncatedField { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_names_field() {
        let oob = OutOfBounds {
            offset: 10,
            needed: 4,
            available: 2,
        };
        let err = oob.in_field("regbus", "regbus.length");
        assert_eq!(err.offset(), Some(10));
        assert_eq!(err.class(), ErrorClass::Structural);
        assert!(err.to_string().contains("regbus.length"));
    }

    #[test]
    fn test_unknown_magic_is_not_this_protocol() {
        let err = DecodeError::UnknownMagic {
            protocol: "regbus",
            found: 0x1234,
        };
        assert!(err.is_not_this_protocol());
        assert_eq!(err.to_string(), "regbus: unknown magic 0x1234");
    }

    #[test]
    fn test_length_overrun_is_structural() {
        let err = DecodeError::LengthOverrun {
            protocol: "modbus",
            declared: 40,
            available: 12,
        };
        assert!(!err.is_not_this_protocol());
        assert_eq!(err.offset(), None);
    }
}
