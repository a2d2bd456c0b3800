//! # wiredissect-core
//!
//! Bounds-checked protocol field decoding with request/response correlation.
//!
//! This crate holds the decoding engine and the built-in protocol decoders,
//! without any capture reading or terminal output. A host hands it transport
//! payloads plus a [`DecodeContext`](protocol::DecodeContext) and gets back
//! annotated field trees.
//!
//! ## Features
//!
//! - **Bounds safety**: every read goes through [`ByteCursor`](wire::ByteCursor);
//!   no input can make a decoder read past its buffer
//! - **Variable-length fields**: continuation-bit varints, TLV regions with
//!   per-tag header layouts, presence bitmasks
//! - **Non-fatal checksums**: a mismatch is an annotation, never an error
//! - **Correlation**: exactly-once request/response matching that stays
//!   stable when frames are decoded again
//!
//! ## Quick Start
//!
//! ```rust
//! use wiredissect_core::prelude::*;
//!
//! let registry = default_registry();
//! let mut session = AnalysisSession::new(SessionConfig::default());
//!
//! let mut ctx = DecodeContext::new(ConversationId(1), 1);
//! ctx.insert_hint(HINT_DST_PORT, 5020);
//!
//! let mut sink = CollectingSink::new();
//! if let Some((_, dissection)) = registry.dissect(&[0x00, 0x01], &ctx, &mut session) {
//!     for message in dissection.messages() {
//!         message.emit(&mut sink);
//!     }
//! }
//! assert!(sink.records().is_empty());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        wiredissect-core                             |
//! +---------------------------------------------------------------------+
//! |  wire/       - ByteCursor, varint, TLV, bitmask, checksums          |
//! |  schema/     - FieldDescriptor, DataKind, FieldCatalog              |
//! |  protocol/   - FieldTree, decoder engine, registry, 3 decoders      |
//! |  correlate/  - TransactionCorrelator, synthetic ids, session        |
//! |  sink        - FieldSink and CollectingSink                         |
//! |  format/     - Value formatting utilities                           |
//! |  error/      - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```

pub mod correlate;
pub mod error;
pub mod format;
pub mod prelude;
pub mod protocol;
pub mod schema;
pub mod sink;
pub mod wire;

// Re-export commonly used types at crate root for convenience
pub use correlate::{AnalysisSession, ConversationId, Direction, MessageRef, SessionConfig};
pub use error::{DecodeError, Error, OutOfBounds, Result};
pub use protocol::{
    default_registry, BuiltinProtocol, DecodeContext, DecodedMessage, Dissection, FieldValue,
    OwnedFieldValue, Protocol, ProtocolRegistry,
};
pub use schema::{DataKind, FieldDescriptor, ProtocolSchema};
pub use sink::{CollectingSink, FieldSink, MessageRecord, OwnedDecodedField};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
