//! Value formatting utilities.
//!
//! Used by field formatters and by the presentation layer:
//! - MAC addresses (6 bytes -> colon-separated hex)
//! - Opaque byte runs (bounded hex preview)
//! - Formatter building blocks (hex, named values, scaled units)

mod address;
pub mod render;

pub use address::{format_hex, format_mac};
