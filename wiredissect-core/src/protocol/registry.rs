//! Protocol registry for managing decoders.

use tracing::{debug, trace};

use crate::correlate::AnalysisSession;
use crate::schema::ProtocolSchema;

use super::{DecodeContext, Dissection, ModbusProtocol, RegBusProtocol, TelemetryProtocol};

/// Priority given to a decoder the user bound to a port.
pub const OVERRIDE_PRIORITY: u32 = 200;

/// Core trait all protocol decoders must implement.
pub trait Protocol: Send + Sync {
    /// Unique identifier for this protocol (e.g., "regbus", "modbus").
    fn name(&self) -> &'static str;

    /// Human-readable display name.
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Check if this decoder can handle the given context.
    /// Returns a priority score (higher = more specific match).
    /// Returns `None` if this decoder cannot handle the context.
    fn can_decode(&self, context: &DecodeContext) -> Option<u32>;

    /// Decode every message in a transport buffer.
    fn decode<'a>(
        &self,
        data: &'a [u8],
        context: &DecodeContext,
        session: &mut AnalysisSession,
    ) -> Dissection<'a>;

    /// Length of the message at the start of `data`, or `None` while more
    /// bytes are needed to tell.
    fn message_length(&self, data: &[u8]) -> Option<usize>;

    /// Return the schema fields this protocol produces.
    fn schema_fields(&self) -> ProtocolSchema;

    /// Well-known port, if the protocol has one.
    fn default_port(&self) -> Option<u16> {
        None
    }
}

/// Enum of all built-in protocol decoders.
///
/// This enables static dispatch (no vtable overhead) for all built-in protocols.
#[derive(Debug, Clone, Copy)]
pub enum BuiltinProtocol {
    RegBus(RegBusProtocol),
    Modbus(ModbusProtocol),
    Telemetry(TelemetryProtocol),
}

/// Macro to delegate Protocol trait methods to inner types.
///
/// The decoders also implement `MessageFormat`, which has its own `name`,
/// so the calls are fully qualified.
macro_rules! delegate_protocol {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            BuiltinProtocol::RegBus(p) => Protocol::$method(p $(, $arg)*),
            BuiltinProtocol::Modbus(p) => Protocol::$method(p $(, $arg)*),
            BuiltinProtocol::Telemetry(p) => Protocol::$method(p $(, $arg)*),
        }
    };
}

impl Protocol for BuiltinProtocol {
    #[inline]
    fn name(&self) -> &'static str {
        delegate_protocol!(self, name)
    }

    #[inline]
    fn display_name(&self) -> &'static str {
        delegate_protocol!(self, display_name)
    }

    #[inline]
    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        delegate_protocol!(self, can_decode, context)
    }

    #[inline]
    fn decode<'a>(
        &self,
        data: &'a [u8],
        context: &DecodeContext,
        session: &mut AnalysisSession,
    ) -> Dissection<'a> {
        delegate_protocol!(self, decode, data, context, session)
    }

    #[inline]
    fn message_length(&self, data: &[u8]) -> Option<usize> {
        delegate_protocol!(self, message_length, data)
    }

    #[inline]
    fn schema_fields(&self) -> ProtocolSchema {
        delegate_protocol!(self, schema_fields)
    }

    #[inline]
    fn default_port(&self) -> Option<u16> {
        delegate_protocol!(self, default_port)
    }
}

impl From<RegBusProtocol> for BuiltinProtocol {
    fn from(p: RegBusProtocol) -> Self {
        BuiltinProtocol::RegBus(p)
    }
}

impl From<ModbusProtocol> for BuiltinProtocol {
    fn from(p: ModbusProtocol) -> Self {
        BuiltinProtocol::Modbus(p)
    }
}

impl From<TelemetryProtocol> for BuiltinProtocol {
    fn from(p: TelemetryProtocol) -> Self {
        BuiltinProtocol::Telemetry(p)
    }
}

/// Registry for protocol decoders with priority-based selection.
///
/// Candidates are tried from the highest priority down; a decoder that
/// reports [`Dissection::NotThisProtocol`] hands the buffer to the next one.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    decoders: Vec<BuiltinProtocol>,
    /// User port bindings: (port, index into `decoders`).
    port_overrides: Vec<(u16, usize)>,
}

impl ProtocolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol decoder.
    pub fn register<P: Into<BuiltinProtocol>>(&mut self, decoder: P) {
        self.decoders.push(decoder.into());
    }

    /// Bind `port` to the decoder named `name`. Returns false for an
    /// unknown name.
    pub fn set_port_override(&mut self, port: u16, name: &str) -> bool {
        let Some(index) = self.decoders.iter().position(|p| p.name() == name) else {
            return false;
        };
        self.port_overrides.retain(|(p, _)| *p != port);
        self.port_overrides.push((port, index));
        true
    }

    fn priority(&self, index: usize, decoder: &BuiltinProtocol, context: &DecodeContext) -> Option<u32> {
        let overridden = self
            .port_overrides
            .iter()
            .any(|&(port, i)| i == index && context.has_port(port));
        if overridden {
            Some(OVERRIDE_PRIORITY)
        } else {
            decoder.can_decode(context)
        }
    }

    /// Decoders that claim the context, best first.
    pub fn candidates(&self, context: &DecodeContext) -> Vec<&BuiltinProtocol> {
        let mut ranked: Vec<_> = self
            .decoders
            .iter()
            .enumerate()
            .filter_map(|(i, p)| self.priority(i, p, context).map(|priority| (p, priority)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().map(|(p, _)| p).collect()
    }

    /// Find the best decoder for the given context.
    #[inline]
    pub fn find(&self, context: &DecodeContext) -> Option<&BuiltinProtocol> {
        self.candidates(context).into_iter().next()
    }

    /// Decode `data` with the first candidate that accepts it.
    pub fn dissect<'a>(
        &self,
        data: &'a [u8],
        context: &DecodeContext,
        session: &mut AnalysisSession,
    ) -> Option<(&BuiltinProtocol, Dissection<'a>)> {
        for decoder in self.candidates(context) {
            let dissection = decoder.decode(data, context, session);
            if dissection.is_not_this_protocol() {
                trace!(protocol = decoder.name(), frame = context.frame, "not this protocol");
                continue;
            }
            return Some((decoder, dissection));
        }
        debug!(frame = context.frame, len = data.len(), "no decoder accepted buffer");
        None
    }

    /// Ports that identify the server side of a conversation: every default
    /// port plus every user binding.
    pub fn server_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .decoders
            .iter()
            .filter_map(|p| p.default_port())
            .chain(self.port_overrides.iter().map(|&(port, _)| port))
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    /// Get all registered decoders.
    pub fn all(&self) -> impl Iterator<Item = &BuiltinProtocol> {
        self.decoders.iter()
    }

    /// Get a decoder by name.
    pub fn get(&self, name: &str) -> Option<&BuiltinProtocol> {
        self.decoders.iter().find(|p| p.name() == name)
    }

    /// Build combined schema from all decoders.
    pub fn combined_schema(&self) -> ProtocolSchema {
        self.decoders.iter().flat_map(|p| p.schema_fields()).collect()
    }

    /// Get the number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{ConversationId, SessionConfig};
    use crate::protocol::test_utils::RegBusBuilder;
    use crate::protocol::HINT_DST_PORT;

    fn registry() -> ProtocolRegistry {
        let mut registry = ProtocolRegistry::new();
        registry.register(RegBusProtocol);
        registry.register(ModbusProtocol);
        registry.register(TelemetryProtocol);
        registry
    }

    fn ctx(port: u16) -> DecodeContext {
        let mut ctx = DecodeContext::new(ConversationId(1), 1);
        ctx.insert_hint(HINT_DST_PORT, port as u64);
        ctx
    }

    #[test]
    fn test_builtin_protocol_size() {
        // All decoders are zero-sized unit structs, so the enum is just the discriminant
        let size = std::mem::size_of::<BuiltinProtocol>();
        assert!(size <= 8, "BuiltinProtocol is {} bytes, expected <= 8", size);
    }

    // Test 1: port hints select the decoder
    #[test]
    fn test_find_by_port() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.find(&ctx(5020)).map(|p| p.name()), Some("regbus"));
        assert_eq!(registry.find(&ctx(502)).map(|p| p.name()), Some("modbus"));
        assert_eq!(registry.find(&ctx(7400)).map(|p| p.name()), Some("telemetry"));
        assert!(registry.find(&ctx(9)).is_none());
    }

    // Test 2: an override outranks the default binding and falls through
    #[test]
    fn test_override_falls_through() {
        let mut registry = registry();
        assert!(registry.set_port_override(5020, "telemetry"));
        assert!(!registry.set_port_override(5020, "nope"));

        let names: Vec<_> = registry.candidates(&ctx(5020)).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["telemetry", "regbus"]);
        assert!(registry.set_port_override(9000, "modbus"));
        assert!(registry.server_ports().contains(&9000));

        let data = RegBusBuilder::new(0x10).payload(vec![0, 0, 0, 0, 1]).build();
        let mut session = AnalysisSession::new(SessionConfig::default());
        let (decoder, dissection) = registry.dissect(&data, &ctx(5020), &mut session).unwrap();
        assert_eq!(decoder.name(), "regbus");
        assert_eq!(dissection.messages().len(), 1);
    }

    // Test 3: nobody claims the bytes
    #[test]
    fn test_dissect_none() {
        let registry = registry();
        let mut session = AnalysisSession::new(SessionConfig::default());
        assert!(registry.dissect(&[1, 2, 3, 4], &ctx(5020), &mut session).is_none());
        assert!(registry.dissect(&[1, 2, 3, 4], &ctx(80), &mut session).is_none());
    }

    #[test]
    fn test_get_by_name() {
        let registry = registry();
        assert_eq!(registry.get("modbus").and_then(|p| p.default_port()), Some(502));
        assert_eq!(registry.get("telemetry").map(|p| p.display_name()), Some("Telemetry"));
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.server_ports(), vec![502, 5020, 7400]);
        assert!(registry.combined_schema().iter().any(|d| d.name == "modbus.exception_code"));
    }
}
