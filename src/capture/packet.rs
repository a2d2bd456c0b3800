//! Raw packet representation.

/// A raw packet from a capture file.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Frame number (1-indexed).
    pub frame_number: u64,

    /// Timestamp in microseconds since epoch.
    pub timestamp_us: u64,

    /// Original length on the wire.
    pub original_length: u32,

    /// Link layer type (e.g., 1 = Ethernet).
    pub link_type: u16,

    /// Captured bytes.
    pub data: Vec<u8>,
}

impl RawPacket {
    pub fn new(frame_number: u64, timestamp_us: u64, original_length: u32, link_type: u16, data: Vec<u8>) -> Self {
        Self {
            frame_number,
            timestamp_us,
            original_length,
            link_type,
            data,
        }
    }

    /// Check if the packet was truncated during capture.
    pub fn is_truncated(&self) -> bool {
        (self.data.len() as u32) < self.original_length
    }
}
