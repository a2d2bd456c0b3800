//! Semantic type tags for protocol fields.

use serde::Serialize;

/// What a field's bytes mean, independent of how they are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Boolean (true/false)
    Bool,

    /// Unsigned 8-bit integer
    UInt8,

    /// Unsigned 16-bit integer
    UInt16,

    /// Unsigned 32-bit integer
    UInt32,

    /// Unsigned 64-bit integer
    UInt64,

    /// Signed 64-bit integer
    Int64,

    /// Integer with named values; the width is given in bytes
    Enum(usize),

    /// Text (UTF-8, lossily decoded)
    String,

    /// Variable-length binary data
    Binary,

    /// Fixed-size binary data
    FixedBinary(usize),

    /// IPv4 address (4 bytes, network order)
    Ipv4,

    /// MAC address (6 bytes)
    Mac,
}

impl DataKind {
    /// Human-readable type name for display.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataKind::Bool => "bool",
            DataKind::UInt8 => "u8",
            DataKind::UInt16 => "u16",
            DataKind::UInt32 => "u32",
            DataKind::UInt64 => "u64",
            DataKind::Int64 => "i64",
            DataKind::Enum(_) => "enum",
            DataKind::String => "string",
            DataKind::Binary => "binary",
            DataKind::FixedBinary(_) => "fixed_binary",
            DataKind::Ipv4 => "ipv4",
            DataKind::Mac => "mac",
        }
    }

    /// Size in bytes for fixed-width types, None for variable-width.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            DataKind::Bool | DataKind::UInt8 => Some(1),
            DataKind::UInt16 => Some(2),
            DataKind::UInt32 | DataKind::Ipv4 => Some(4),
            DataKind::UInt64 | DataKind::Int64 => Some(8),
            DataKind::Mac => Some(6),
            DataKind::Enum(n) | DataKind::FixedBinary(n) => Some(*n),
            DataKind::String | DataKind::Binary => None,
        }
    }

    /// Whether values of this kind are integers.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataKind::UInt8
                | DataKind::UInt16
                | DataKind::UInt32
                | DataKind::UInt64
                | DataKind::Int64
                | DataKind::Enum(_)
        )
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}
