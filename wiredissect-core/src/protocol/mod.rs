//! Protocol decoding framework.
//!
//! This module provides:
//! - [`FieldTree`] and [`DecodedField`] for collecting fields as they are read
//! - [`decoder`], the generic message engine driven by [`MessageFormat`]
//! - [`Protocol`] trait and [`ProtocolRegistry`] for choosing a decoder
//! - Built-in decoders for the supported protocols
//!
//! ## Supported Protocols
//!
//! | Protocol | Transport | Port | Framing |
//! |----------|-----------|------|---------|
//! | RegBus | UDP | 5020 | magic, type, sequence, length, checksum |
//! | Modbus/TCP | TCP | 502 | MBAP header |
//! | Telemetry | UDP | 7400 | magic, varint length, CRC-16 |
//!
//! ## Example
//!
//! ```rust
//! use wiredissect_core::correlate::{AnalysisSession, ConversationId, SessionConfig};
//! use wiredissect_core::protocol::{default_registry, DecodeContext, HINT_DST_PORT};
//!
//! let registry = default_registry();
//! let mut session = AnalysisSession::new(SessionConfig::default());
//! let mut ctx = DecodeContext::new(ConversationId(1), 1);
//! ctx.insert_hint(HINT_DST_PORT, 5020);
//!
//! // A RegBus STATUS message whose checksum does not match
//! let data = [0x52, 0x42, 0x10, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x0e, 0x10, 0x12, 0x34];
//! if let Some((_, dissection)) = registry.dissect(&data, &ctx, &mut session) {
//!     for message in dissection.messages() {
//!         println!("{}", message.summary());
//!     }
//! }
//! ```

mod context;
pub mod decoder;
mod field;
mod registry;
mod tree;

pub mod modbus;
pub mod regbus;
pub mod telemetry;

// Test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;

pub use context::{
    CorrelationInfo, DecodeContext, DecodedMessage, Dissection, HintEntry, Role, HINT_DST_PORT,
    HINT_SRC_PORT, HINT_TRANSPORT,
};
pub use decoder::{decode_buffer, message_length, MessageFormat};
pub use field::{FieldValue, OwnedFieldValue};
pub use registry::{BuiltinProtocol, Protocol, ProtocolRegistry, OVERRIDE_PRIORITY};
pub use tree::{decode_fixed, Annotation, DecodedField, FieldTree};

pub use modbus::ModbusProtocol;
pub use regbus::RegBusProtocol;
pub use telemetry::TelemetryProtocol;

/// Create a registry with all built-in protocol decoders.
pub fn default_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();
    registry.register(RegBusProtocol);
    registry.register(ModbusProtocol);
    registry.register(TelemetryProtocol);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_registry();
        let names: Vec<_> = registry.all().map(|p| p.name()).collect();
        assert_eq!(names, vec!["regbus", "modbus", "telemetry"]);
    }

    #[test]
    fn test_schema_names_are_unique() {
        let schema = default_registry().combined_schema();
        let mut names: Vec<_> = schema.iter().map(|d| d.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }
}
