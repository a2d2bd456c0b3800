//! Convenient re-exports for common usage.
//!
//! # Example
//!
//! ```rust
//! use wiredissect_core::prelude::*;
//!
//! let registry = default_registry();
//! let session = AnalysisSession::new(SessionConfig::default());
//! assert_eq!(registry.len(), 3);
//! assert!(session.correlator().is_empty());
//! ```

// Schema types
pub use crate::schema::{DataKind, FieldDescriptor, ProtocolSchema};

// Protocol types
pub use crate::protocol::{
    default_registry, Annotation, BuiltinProtocol, DecodeContext, DecodedField, DecodedMessage,
    Dissection, FieldValue, Protocol, ProtocolRegistry, HINT_DST_PORT, HINT_SRC_PORT,
};

// Correlation
pub use crate::correlate::{AnalysisSession, ConversationId, Direction, MessageRef, SessionConfig};

// Output
pub use crate::sink::{CollectingSink, FieldSink, MessageRecord};

// Error types
pub use crate::error::{DecodeError, Error, Result};
