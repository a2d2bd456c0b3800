//! Building blocks for field formatters.

use compact_str::{format_compact, CompactString};

use crate::protocol::FieldValue;

/// Render an integer in hex, zero-padded to the width of its variant.
pub fn hex(value: &FieldValue<'_>) -> Option<CompactString> {
    Some(match value {
        FieldValue::UInt8(v) => format_compact!("{v:#04x}"),
        FieldValue::UInt16(v) => format_compact!("{v:#06x}"),
        FieldValue::UInt32(v) => format_compact!("{v:#010x}"),
        FieldValue::UInt64(v) => format_compact!("{v:#018x}"),
        _ => return None,
    })
}

/// Render an integer as `name (value)` using a lookup table.
///
/// Values missing from the table fall back to the default display.
pub fn named(value: &FieldValue<'_>, names: &[(u64, &str)]) -> Option<CompactString> {
    let v = value.as_u64()?;
    names
        .iter()
        .find(|(k, _)| *k == v)
        .map(|(_, name)| format_compact!("{name} ({v})"))
}

/// Render a scaled integer as a fixed-point decimal with a unit suffix.
pub fn scaled(value: &FieldValue<'_>, divisor: u64, unit: &str) -> Option<CompactString> {
    let v = value.as_u64()?;
    let digits = divisor.checked_ilog10()? as usize;
    if digits == 0 {
        return Some(format_compact!("{v} {unit}"));
    }
    Some(format_compact!(
        "{}.{:0digits$} {unit}",
        v / divisor,
        v % divisor
    ))
}
