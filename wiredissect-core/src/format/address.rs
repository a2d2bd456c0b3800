//! Address and byte-run formatting.

use std::fmt::Write;

/// Format 6 bytes as a MAC address string in colon-separated hex format.
///
/// Returns `None` if the slice is not exactly 6 bytes.
///
/// # Example
///
/// ```
/// use wiredissect_core::format::format_mac;
///
/// let bytes = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
/// assert_eq!(format_mac(&bytes), Some("aa:bb:cc:dd:ee:ff".to_string()));
/// ```
pub fn format_mac(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 6 {
        return None;
    }
    Some(format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    ))
}

/// Hex preview of at most `max` bytes, with an ellipsis when cut short.
///
/// # Example
///
/// ```
/// use wiredissect_core::format::format_hex;
///
/// assert_eq!(format_hex(&[0xde, 0xad, 0xbe, 0xef], 8), "deadbeef");
/// assert_eq!(format_hex(&[0xde, 0xad, 0xbe, 0xef], 2), "dead...");
/// ```
pub fn format_hex(bytes: &[u8], max: usize) -> String {
    let shown = &bytes[..bytes.len().min(max)];
    let mut out = String::with_capacity(shown.len() * 2 + 3);
    for b in shown {
        let _ = write!(out, "{b:02x}");
    }
    if bytes.len() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac_invalid_length() {
        assert_eq!(format_mac(&[0; 5]), None);
        assert_eq!(format_mac(&[0; 7]), None);
        assert_eq!(
            format_mac(&[0x00, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]),
            Some("00:1b:2c:3d:4e:5f".to_string())
        );
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[], 4), "");
        assert_eq!(format_hex(&[0x01, 0x02], 2), "0102");
        assert_eq!(format_hex(&[0x01, 0x02, 0x03], 2), "0102...");
    }
}
