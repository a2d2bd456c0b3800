//! Field value types for decoded messages.
//!
//! FieldValue references message bytes directly where possible (Str, Bytes)
//! and owns data only when a value has to be constructed (OwnedString,
//! OwnedBytes).

use std::net::{IpAddr, Ipv4Addr};

use compact_str::CompactString;
use serde::ser::{Serialize, Serializer};

use crate::format::{format_hex, format_mac};

/// Longest byte run shown in full by `Display`.
const HEX_PREVIEW: usize = 16;

/// A decoded field value.
///
/// The lifetime parameter `'data` ties borrowed variants to the buffer the
/// message was decoded from.
#[derive(Debug, Clone)]
pub enum FieldValue<'data> {
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// Signed 64-bit integer
    Int64(i64),
    /// Boolean value
    Bool(bool),

    /// IP address
    IpAddr(IpAddr),
    /// MAC address (6 bytes)
    MacAddr([u8; 6]),

    /// Zero-copy string reference into message data.
    Str(&'data str),
    /// Zero-copy byte slice reference into message data.
    Bytes(&'data [u8]),

    /// Owned string for constructed values (lossy text, enum names).
    OwnedString(CompactString),
    /// Owned bytes for constructed data.
    OwnedBytes(Vec<u8>),

    /// Null/missing value
    Null,
}

/// Type alias for FieldValue that owns all its data.
pub type OwnedFieldValue = FieldValue<'static>;

impl<'data> FieldValue<'data> {
    /// Create a MAC address from bytes.
    pub fn mac(bytes: &[u8]) -> Self {
        match <[u8; 6]>::try_from(bytes) {
            Ok(mac) => FieldValue::MacAddr(mac),
            Err(_) => FieldValue::Null,
        }
    }

    /// Create an IPv4 address from bytes.
    pub fn ipv4(bytes: &[u8]) -> Self {
        match <[u8; 4]>::try_from(bytes) {
            Ok(octets) => FieldValue::IpAddr(IpAddr::V4(Ipv4Addr::from(octets))),
            Err(_) => FieldValue::Null,
        }
    }

    /// Text borrowed from the message when it is valid UTF-8, lossily
    /// converted otherwise.
    pub fn text(bytes: &'data [u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => FieldValue::Str(s),
            Err(_) => FieldValue::OwnedString(CompactString::new(String::from_utf8_lossy(bytes))),
        }
    }

    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt8(v) => Some(*v as u64),
            FieldValue::UInt16(v) => Some(*v as u64),
            FieldValue::UInt32(v) => Some(*v as u64),
            FieldValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as str reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::OwnedString(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            FieldValue::OwnedBytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Convert to an owned version.
    /// Copies borrowed data into owned variants.
    pub fn to_owned(&self) -> OwnedFieldValue {
        match self {
            FieldValue::UInt8(v) => FieldValue::UInt8(*v),
            FieldValue::UInt16(v) => FieldValue::UInt16(*v),
            FieldValue::UInt32(v) => FieldValue::UInt32(*v),
            FieldValue::UInt64(v) => FieldValue::UInt64(*v),
            FieldValue::Int64(v) => FieldValue::Int64(*v),
            FieldValue::Bool(v) => FieldValue::Bool(*v),
            FieldValue::IpAddr(v) => FieldValue::IpAddr(*v),
            FieldValue::MacAddr(v) => FieldValue::MacAddr(*v),
            FieldValue::Str(s) => FieldValue::OwnedString(CompactString::new(s)),
            FieldValue::Bytes(b) => FieldValue::OwnedBytes(b.to_vec()),
            FieldValue::OwnedString(s) => FieldValue::OwnedString(s.clone()),
            FieldValue::OwnedBytes(b) => FieldValue::OwnedBytes(b.clone()),
            FieldValue::Null => FieldValue::Null,
        }
    }
}

impl<'data> std::fmt::Display for FieldValue<'data> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::UInt8(v) => write!(f, "{v}"),
            FieldValue::UInt16(v) => write!(f, "{v}"),
            FieldValue::UInt32(v) => write!(f, "{v}"),
            FieldValue::UInt64(v) => write!(f, "{v}"),
            FieldValue::Int64(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::OwnedString(s) => write!(f, "{s}"),
            FieldValue::Bytes(b) => write_bytes(f, b),
            FieldValue::OwnedBytes(b) => write_bytes(f, b),
            FieldValue::IpAddr(addr) => write!(f, "{addr}"),
            FieldValue::MacAddr(mac) => write!(f, "{}", format_mac(mac).unwrap_or_default()),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

fn write_bytes(f: &mut std::fmt::Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
    if bytes.is_empty() {
        return write!(f, "<empty>");
    }
    write!(f, "{} ({} bytes)", format_hex(bytes, HEX_PREVIEW), bytes.len())
}

impl<'data> Serialize for FieldValue<'data> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::UInt8(v) => serializer.serialize_u8(*v),
            FieldValue::UInt16(v) => serializer.serialize_u16(*v),
            FieldValue::UInt32(v) => serializer.serialize_u32(*v),
            FieldValue::UInt64(v) => serializer.serialize_u64(*v),
            FieldValue::Int64(v) => serializer.serialize_i64(*v),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::OwnedString(s) => serializer.serialize_str(s),
            // Byte runs travel as lowercase hex
            FieldValue::Bytes(b) => serializer.serialize_str(&format_hex(b, usize::MAX)),
            FieldValue::OwnedBytes(b) => serializer.serialize_str(&format_hex(b, usize::MAX)),
            FieldValue::IpAddr(addr) => serializer.collect_str(addr),
            FieldValue::MacAddr(mac) => serializer.collect_str(&FieldValue::MacAddr(*mac)),
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

// Implement PartialEq manually to handle borrowed vs owned comparison
impl<'a, 'b> PartialEq<FieldValue<'b>> for FieldValue<'a> {
    fn eq(&self, other: &FieldValue<'b>) -> bool {
        match (self, other) {
            (FieldValue::UInt8(a), FieldValue::UInt8(b)) => a == b,
            (FieldValue::UInt16(a), FieldValue::UInt16(b)) => a == b,
            (FieldValue::UInt32(a), FieldValue::UInt32(b)) => a == b,
            (FieldValue::UInt64(a), FieldValue::UInt64(b)) => a == b,
            (FieldValue::Int64(a), FieldValue::Int64(b)) => a == b,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::IpAddr(a), FieldValue::IpAddr(b)) => a == b,
            (FieldValue::MacAddr(a), FieldValue::MacAddr(b)) => a == b,
            (FieldValue::Null, FieldValue::Null) => true,
            _ => match (self.as_str(), other.as_str()) {
                (Some(a), Some(b)) => a == b,
                _ => matches!((self.as_bytes(), other.as_bytes()), (Some(a), Some(b)) if a == b),
            },
        }
    }
}
