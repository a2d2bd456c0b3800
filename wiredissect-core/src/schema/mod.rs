//! Static field schema types.
//!
//! Every protocol describes its fields with [`FieldDescriptor`]s held in
//! read-only statics. Self-describing protocols additionally keep a
//! [`FieldCatalog`] that maps an on-wire identifier to a descriptor.
//!
//! # Example
//!
//! ```rust
//! use wiredissect_core::schema::{DataKind, FieldCatalog, FieldDescriptor, FieldSize};
//!
//! static REGISTERS: FieldCatalog<u8> = FieldCatalog::new(
//!     "registers",
//!     &[
//!         (0x00, FieldDescriptor::new("dev.id", "Device ID", DataKind::UInt32)),
//!         (
//!             0x01,
//!             FieldDescriptor::new("dev.name", "Name", DataKind::String)
//!                 .with_size(FieldSize::LengthPrefixed(1)),
//!         ),
//!     ],
//! );
//!
//! assert_eq!(REGISTERS.find(0x00).map(|d| d.name), Some("dev.id"));
//! assert!(REGISTERS.find(0x7F).is_none());
//! ```

mod catalog;
mod field;
mod kind;

pub use catalog::FieldCatalog;
pub use field::{FieldDescriptor, FieldSize, Formatter};
pub use kind::DataKind;

/// A protocol's complete schema.
pub type ProtocolSchema = Vec<&'static FieldDescriptor>;
