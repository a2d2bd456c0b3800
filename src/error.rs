//! Error types for the wiredissect CLI.

use thiserror::Error;

/// Errors related to reading a capture file.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },
}

impl From<CaptureError> for wiredissect_core::Error {
    fn from(err: CaptureError) -> Self {
        wiredissect_core::Error::Capture {
            reason: err.to_string(),
        }
    }
}

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, wiredissect_core::Error>;
