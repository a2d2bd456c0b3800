//! Checksum computation and verification.
//!
//! A checksum mismatch is a diagnostic: the message decoder attaches it to the
//! checksum field as an annotation and keeps every other field.

use std::ops::Range;

use serde::Serialize;

use crate::error::OutOfBounds;

use super::{ByteCursor, Endian};

/// Checksum functions known to the built-in protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    /// Rotating 16-bit ones-complement sum over XOR-masked bytes.
    MaskedOnesComplement16,
    /// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection).
    Crc16Ccitt,
}

impl ChecksumAlgorithm {
    /// Width of the transmitted checksum in bytes.
    pub fn width(&self) -> usize {
        match self {
            ChecksumAlgorithm::MaskedOnesComplement16 | ChecksumAlgorithm::Crc16Ccitt => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::MaskedOnesComplement16 => "masked ones-complement-16",
            ChecksumAlgorithm::Crc16Ccitt => "CRC-16/CCITT",
        }
    }

    pub fn compute(&self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::MaskedOnesComplement16 => masked_ones_complement16(data) as u32,
            ChecksumAlgorithm::Crc16Ccitt => crc16_ccitt(data) as u32,
        }
    }
}

/// XOR masks applied to bytes at even and odd positions.
const EVEN_MASK: u8 = 0x5A;
const ODD_MASK: u8 = 0xA5;

/// Rotating ones-complement sum with per-byte masking.
///
/// Each byte is XORed with a position-dependent mask and placed in the high
/// (even position) or low (odd position) half of a 16-bit word. The running
/// sum is rotated left by one bit before each word is added with end-around
/// carry, which makes the result depend on byte order. The transmitted value
/// is the complement of the sum.
pub fn masked_ones_complement16(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for (i, &b) in data.iter().enumerate() {
        let word = if i % 2 == 0 {
            ((b ^ EVEN_MASK) as u32) << 8
        } else {
            (b ^ ODD_MASK) as u32
        };
        sum = ((sum << 1) | (sum >> 15)) & 0xFFFF;
        sum += word;
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// CRC-16/CCITT-FALSE.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Outcome of checking a transmitted checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumVerdict {
    pub algorithm: ChecksumAlgorithm,
    pub computed: u32,
    pub received: u32,
    /// Absolute range the checksum covers.
    pub covered: Range<usize>,
    /// Absolute offset of the transmitted value.
    pub received_at: usize,
}

impl ChecksumVerdict {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.computed == self.received
    }
}

/// Compute the checksum over `covered` and compare it with the value stored
/// at `received_at`.
///
/// Fails only when either range lies outside the cursor's readable region.
pub fn validate(
    algorithm: ChecksumAlgorithm,
    cursor: &ByteCursor<'_>,
    covered: Range<usize>,
    received_at: usize,
    endian: Endian,
) -> Result<ChecksumVerdict, OutOfBounds> {
    let bytes = cursor.slice(covered.start, covered.end.saturating_sub(covered.start))?;
    let raw = cursor.slice(received_at, algorithm.width())?;
    let received = ByteCursor::new(raw).read_uint(algorithm.width(), endian)? as u32;
    Ok(ChecksumVerdict {
        algorithm,
        computed: algorithm.compute(bytes),
        received,
        covered,
        received_at,
    })
}
