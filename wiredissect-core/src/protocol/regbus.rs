//! RegBus protocol decoder.
//!
//! RegBus is a small register-access protocol carried over UDP. Several
//! messages may share one datagram, each closed by a masked ones-complement
//! checksum. Reads and writes are answered by responses carrying the same
//! sequence number.

use compact_str::CompactString;

use super::decoder::{
    decode_buffer, BodyContext, ChecksumSpec, DispatchEntry, DispatchTable, Exchange,
    MessageFormat, MessageHeader,
};
use super::{Annotation, DecodeContext, Dissection, FieldTree, FieldValue, Protocol};
use crate::correlate::{AnalysisSession, Direction};
use crate::error::DecodeError;
use crate::format::render;
use crate::schema::{DataKind, FieldCatalog, FieldDescriptor, FieldSize, ProtocolSchema};
use crate::wire::{ByteCursor, ChecksumAlgorithm, Endian};

/// RegBus UDP port.
pub const REGBUS_PORT: u16 = 5020;

/// Magic of version 1 headers ("RB").
pub const MAGIC_V1: u16 = 0x5242;
/// Magic of version 2 headers ("Rb").
pub const MAGIC_V2: u16 = 0x5262;

/// RegBus message types.
pub mod message_type {
    pub const READ_REGISTER: u8 = 0x01;
    pub const WRITE_REGISTER: u8 = 0x02;
    pub const WRITE_REGISTER_QUIET: u8 = 0x03;
    pub const STATUS: u8 = 0x10;
    pub const READ_REGISTER_RESPONSE: u8 = 0x81;
    pub const WRITE_REGISTER_ACK: u8 = 0x82;
}

/// Register addresses.
pub mod register {
    pub const DEVICE_ID: u8 = 0x00;
    pub const FIRMWARE_VERSION: u8 = 0x01;
    pub const IP_ADDRESS: u8 = 0x02;
    pub const MAC_ADDRESS: u8 = 0x03;
    pub const OPERATING_MODE: u8 = 0x04;
    pub const TEMPERATURE: u8 = 0x05;
    pub const DEVICE_NAME: u8 = 0x06;
    pub const DIAGNOSTICS: u8 = 0x07;
}

const OPERATING_MODES: &[(u64, &str)] = &[(0, "idle"), (1, "run"), (2, "fault"), (3, "maintenance")];
const ACK_STATUS: &[(u64, &str)] = &[(0, "ok"), (1, "read-only register"), (2, "bad value"), (3, "busy")];

fn render_magic(value: &FieldValue<'_>) -> Option<CompactString> {
    match value.as_u64()? as u16 {
        MAGIC_V1 => Some("RB (v1)".into()),
        MAGIC_V2 => Some("Rb (v2)".into()),
        _ => None,
    }
}

fn render_type(value: &FieldValue<'_>) -> Option<CompactString> {
    let op = value.as_u64()?;
    DISPATCH
        .name(op as u32)
        .map(|name| compact_str::format_compact!("{name} ({op:#04x})"))
}

fn render_address(value: &FieldValue<'_>) -> Option<CompactString> {
    let addr = value.as_u64()?;
    let desc = REGISTERS.find(addr as u8)?;
    Some(compact_str::format_compact!("{} ({addr:#04x})", desc.display))
}

fn render_firmware(value: &FieldValue<'_>) -> Option<CompactString> {
    let v = value.as_u64()?;
    Some(compact_str::format_compact!("v{}.{}", v >> 8, v & 0xFF))
}

fn render_mode(value: &FieldValue<'_>) -> Option<CompactString> {
    render::named(value, OPERATING_MODES)
}

fn render_temperature(value: &FieldValue<'_>) -> Option<CompactString> {
    render::scaled(value, 10, "C")
}

fn render_ack(value: &FieldValue<'_>) -> Option<CompactString> {
    render::named(value, ACK_STATUS)
}

fn render_uptime(value: &FieldValue<'_>) -> Option<CompactString> {
    render::scaled(value, 1, "s")
}

pub static MAGIC: FieldDescriptor =
    FieldDescriptor::new("regbus.magic", "Magic", DataKind::UInt16).with_render(render_magic);
pub static TYPE: FieldDescriptor =
    FieldDescriptor::new("regbus.type", "Type", DataKind::Enum(1)).with_render(render_type);
pub static SEQUENCE: FieldDescriptor = FieldDescriptor::new("regbus.sequence", "Sequence", DataKind::UInt8);
pub static LENGTH: FieldDescriptor = FieldDescriptor::new("regbus.length", "Length", DataKind::UInt16);
pub static READ_ADDRESS: FieldDescriptor =
    FieldDescriptor::new("regbus.read.address", "Register", DataKind::UInt8).with_render(render_address);
pub static WRITE_ADDRESS: FieldDescriptor =
    FieldDescriptor::new("regbus.write.address", "Register", DataKind::UInt8).with_render(render_address);
pub static ACK_STATUS_FIELD: FieldDescriptor =
    FieldDescriptor::new("regbus.ack.status", "Status", DataKind::Enum(1)).with_render(render_ack);
pub static STATUS_CODE: FieldDescriptor = FieldDescriptor::new("regbus.status.code", "Status", DataKind::UInt8);
pub static STATUS_UPTIME: FieldDescriptor =
    FieldDescriptor::new("regbus.status.uptime", "Uptime", DataKind::UInt32).with_render(render_uptime);
pub static PAYLOAD: FieldDescriptor = FieldDescriptor::new("regbus.payload", "Payload", DataKind::Binary)
    .with_description("Bytes whose layout could not be determined");
pub static CHECKSUM: FieldDescriptor =
    FieldDescriptor::new("regbus.checksum", "Checksum", DataKind::UInt16).with_render(render::hex);

/// Register catalog, keyed by register address.
pub static REGISTERS: FieldCatalog<u8> = FieldCatalog::new(
    "regbus.registers",
    &[
        (
            register::DEVICE_ID,
            FieldDescriptor::new("regbus.reg.device_id", "Device ID", DataKind::UInt32).with_render(render::hex),
        ),
        (
            register::FIRMWARE_VERSION,
            FieldDescriptor::new("regbus.reg.firmware_version", "Firmware", DataKind::UInt16)
                .with_render(render_firmware),
        ),
        (
            register::IP_ADDRESS,
            FieldDescriptor::new("regbus.reg.ip_address", "IP Address", DataKind::Ipv4),
        ),
        (
            register::MAC_ADDRESS,
            FieldDescriptor::new("regbus.reg.mac_address", "MAC Address", DataKind::Mac),
        ),
        (
            register::OPERATING_MODE,
            FieldDescriptor::new("regbus.reg.operating_mode", "Mode", DataKind::Enum(1)).with_render(render_mode),
        ),
        (
            register::TEMPERATURE,
            FieldDescriptor::new("regbus.reg.temperature", "Temperature", DataKind::UInt16)
                .with_render(render_temperature),
        ),
        (
            register::DEVICE_NAME,
            FieldDescriptor::new("regbus.reg.device_name", "Device Name", DataKind::String)
                .with_size(FieldSize::LengthPrefixed(1)),
        ),
        (
            register::DIAGNOSTICS,
            FieldDescriptor::new("regbus.reg.diagnostics", "Diagnostics", DataKind::Binary)
                .with_description("Vendor dump; its length is not on the wire"),
        ),
    ],
);

static DISPATCH: DispatchTable = DispatchTable::new(&[
    DispatchEntry::new(message_type::READ_REGISTER as u32, "READ_REGISTER", decode_read),
    DispatchEntry::new(
        message_type::READ_REGISTER_RESPONSE as u32,
        "READ_REGISTER_RESPONSE",
        decode_read_response,
    ),
    DispatchEntry::new(message_type::WRITE_REGISTER as u32, "WRITE_REGISTER", decode_write),
    DispatchEntry::new(message_type::WRITE_REGISTER_ACK as u32, "WRITE_REGISTER_ACK", decode_ack),
    DispatchEntry::new(
        message_type::WRITE_REGISTER_QUIET as u32,
        "WRITE_REGISTER_QUIET",
        decode_write,
    ),
    DispatchEntry::new(message_type::STATUS as u32, "STATUS", decode_status),
]);

/// Sequence of register addresses to read.
fn decode_read<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    while !cur.is_empty() {
        let addr = tree.read_u8(cur, &READ_ADDRESS)?;
        if REGISTERS.find(addr).is_none() {
            tree.annotate_last(Annotation::UnknownField { id: addr as u32 });
        }
        body.params.push(addr as u32);
    }
    Ok(())
}

/// Register values in the order the request listed them.
fn decode_read_response<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    let Some(addresses) = body.request_params.take() else {
        tree.opaque(cur, &PAYLOAD, Annotation::ContextDependent { reason: "the request" });
        return Ok(());
    };
    for &addr in &addresses {
        if cur.is_empty() {
            break;
        }
        match REGISTERS.find(addr as u8) {
            Some(desc) if desc.size.is_walkable() => {
                tree.read_value(cur, desc, Endian::Big)?;
            }
            Some(_) => {
                tree.opaque(cur, &PAYLOAD, Annotation::UnwalkableField { id: addr });
                break;
            }
            None => {
                tree.opaque(cur, &PAYLOAD, Annotation::UnknownField { id: addr });
                break;
            }
        }
    }
    body.request_params = Some(addresses);
    Ok(())
}

/// `{address, value}` pairs. Stops at the first register whose size is not
/// known and shows the rest raw, starting at that address byte.
fn decode_write<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    while !cur.is_empty() {
        let addr = cur.peek_u8().map_err(|e| e.in_field("regbus", WRITE_ADDRESS.name))?;
        match REGISTERS.find(addr) {
            Some(desc) if desc.size.is_walkable() => {
                tree.read_u8(cur, &WRITE_ADDRESS)?;
                tree.nested(|t| t.read_value(cur, desc, Endian::Big))?;
            }
            Some(_) => {
                tree.opaque(cur, &PAYLOAD, Annotation::UnwalkableField { id: addr as u32 });
            }
            None => {
                tree.opaque(cur, &PAYLOAD, Annotation::UnknownField { id: addr as u32 });
            }
        }
    }
    Ok(())
}

fn decode_ack<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    tree.read_u8(cur, &ACK_STATUS_FIELD)?;
    Ok(())
}

fn decode_status<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    tree.read_u8(cur, &STATUS_CODE)?;
    tree.read_u32(cur, &STATUS_UPTIME, Endian::Big)?;
    Ok(())
}

/// RegBus protocol decoder.
#[derive(Debug, Clone, Copy)]
pub struct RegBusProtocol;

impl MessageFormat for RegBusProtocol {
    fn name(&self) -> &'static str {
        "regbus"
    }

    fn read_header<'a>(
        &self,
        cur: &mut ByteCursor<'a>,
        tree: &mut FieldTree<'a>,
    ) -> Result<MessageHeader, DecodeError> {
        let mut probe = *cur;
        let magic = probe
            .read_u16(Endian::Big)
            .map_err(|e| e.in_field("regbus", MAGIC.name))?;
        if magic != MAGIC_V1 && magic != MAGIC_V2 {
            return Err(DecodeError::UnknownMagic {
                protocol: "regbus",
                found: magic as u64,
            });
        }
        tree.read_u16(cur, &MAGIC, Endian::Big)?;
        let msg_type = tree.read_u8(cur, &TYPE)?;
        let sequence = tree.read_u8(cur, &SEQUENCE)?;
        let length = tree.read_u16(cur, &LENGTH, Endian::Big)?;

        Ok(MessageHeader {
            opcode: msg_type as u32,
            transaction_id: Some(sequence as u32),
            payload_len: length as usize,
            trailer_len: ChecksumAlgorithm::MaskedOnesComplement16.width(),
        })
    }

    fn dispatch(&self) -> &DispatchTable {
        &DISPATCH
    }

    fn checksum(&self) -> Option<ChecksumSpec> {
        Some(ChecksumSpec {
            algorithm: ChecksumAlgorithm::MaskedOnesComplement16,
            endian: Endian::Big,
            descriptor: &CHECKSUM,
        })
    }

    fn exchange(&self, header: &MessageHeader, _direction: Direction) -> Option<Exchange> {
        use message_type::*;
        match header.opcode as u8 {
            READ_REGISTER => Some(Exchange::request(READ_REGISTER_RESPONSE as u32)),
            READ_REGISTER_RESPONSE => Some(Exchange::response(READ_REGISTER_RESPONSE as u32)),
            WRITE_REGISTER => Some(Exchange::request(WRITE_REGISTER_ACK as u32)),
            WRITE_REGISTER_ACK => Some(Exchange::response(WRITE_REGISTER_ACK as u32)),
            _ => None,
        }
    }

    fn opaque_descriptor(&self) -> &'static FieldDescriptor {
        &PAYLOAD
    }

    fn summary_fields(&self) -> &'static [&'static str] {
        &["regbus.length"]
    }
}

impl Protocol for RegBusProtocol {
    fn name(&self) -> &'static str {
        "regbus"
    }

    fn display_name(&self) -> &'static str {
        "RegBus"
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        context.has_port(REGBUS_PORT).then_some(100)
    }

    fn decode<'a>(
        &self,
        data: &'a [u8],
        context: &DecodeContext,
        session: &mut AnalysisSession,
    ) -> Dissection<'a> {
        decode_buffer(self, data, context, session)
    }

    fn message_length(&self, data: &[u8]) -> Option<usize> {
        self.frame_length(data)
    }

    fn schema_fields(&self) -> ProtocolSchema {
        let mut fields = vec![
            &MAGIC,
            &TYPE,
            &SEQUENCE,
            &LENGTH,
            &READ_ADDRESS,
            &WRITE_ADDRESS,
            &ACK_STATUS_FIELD,
            &STATUS_CODE,
            &STATUS_UPTIME,
        ];
        fields.extend(REGISTERS.iter().map(|(_, d)| d));
        fields.push(&PAYLOAD);
        fields.push(&CHECKSUM);
        fields
    }

    fn default_port(&self) -> Option<u16> {
        Some(REGBUS_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{ConversationId, MessageRef, SessionConfig};
    use crate::protocol::test_utils::RegBusBuilder;

    fn session() -> AnalysisSession {
        AnalysisSession::new(SessionConfig::default())
    }

    fn ctx(frame: u64) -> DecodeContext {
        DecodeContext::new(ConversationId(1), frame)
    }

    // Test 1: header fields and checksum
    #[test]
    fn test_read_request() {
        let data = RegBusBuilder::new(message_type::READ_REGISTER)
            .sequence(7)
            .payload(vec![register::DEVICE_ID, register::FIRMWARE_VERSION, register::TEMPERATURE])
            .build();
        let mut s = session();
        let d = RegBusProtocol.decode(&data, &ctx(1), &mut s);
        let msg = &d.messages()[0];

        assert!(msg.error.is_none());
        assert_eq!(msg.type_name, Some("READ_REGISTER"));
        assert_eq!(msg.field("regbus.magic").unwrap().rendered, "RB (v1)");
        assert_eq!(msg.field("regbus.type").unwrap().rendered, "READ_REGISTER (0x01)");
        let addrs: Vec<_> = msg
            .fields
            .iter()
            .filter(|f| f.name() == "regbus.read.address")
            .map(|f| f.rendered.as_str())
            .collect();
        assert_eq!(addrs, vec!["Device ID (0x00)", "Firmware (0x01)", "Temperature (0x05)"]);
        assert!(msg.checksum.as_ref().unwrap().is_valid());
        assert_eq!(msg.field("regbus.checksum").unwrap().range, 9..11);
    }

    // Test 2: read response decoded with the request's address list
    #[test]
    fn test_read_response_uses_request() {
        let mut s = session();
        let req = RegBusBuilder::new(message_type::READ_REGISTER)
            .sequence(3)
            .payload(vec![register::FIRMWARE_VERSION, register::DEVICE_NAME, register::IP_ADDRESS])
            .build();
        let resp = RegBusBuilder::new(message_type::READ_REGISTER_RESPONSE)
            .sequence(3)
            .payload(vec![0x02, 0x07, 0x04, b'p', b'u', b'm', b'p', 192, 168, 0, 9])
            .build();

        RegBusProtocol.decode(&req, &ctx(1), &mut s);
        let d = RegBusProtocol.decode(&resp, &ctx(2), &mut s);
        let msg = &d.messages()[0];
        assert_eq!(msg.field("regbus.reg.firmware_version").unwrap().rendered, "v2.7");
        assert_eq!(msg.field("regbus.reg.device_name").unwrap().value, FieldValue::Str("pump"));
        assert_eq!(msg.field("regbus.reg.ip_address").unwrap().rendered, "192.168.0.9");
        assert_eq!(msg.correlation.as_ref().unwrap().peer, Some(MessageRef::new(1, 0)));
    }

    // Test 3: response without its request stays opaque
    #[test]
    fn test_read_response_without_request() {
        let resp = RegBusBuilder::new(message_type::READ_REGISTER_RESPONSE)
            .sequence(9)
            .payload(vec![0x00, 0x01])
            .build();
        let mut s = session();
        let d = RegBusProtocol.decode(&resp, &ctx(4), &mut s);
        let msg = &d.messages()[0];
        let raw = msg.field("regbus.payload").unwrap();
        assert_eq!(raw.annotations[0], Annotation::ContextDependent { reason: "the request" });
        assert!(msg.correlation.is_none());
        assert!(msg.error.is_none());
    }

    // Test 4: an unwalkable register ends the write
    #[test]
    fn test_write_stops_at_variable_register() {
        let data = RegBusBuilder::new(message_type::WRITE_REGISTER)
            .sequence(1)
            .payload(vec![register::OPERATING_MODE, 1, register::DIAGNOSTICS, 0xAA, 0xBB])
            .build();
        let mut s = session();
        let d = RegBusProtocol.decode(&data, &ctx(1), &mut s);
        let msg = &d.messages()[0];
        assert_eq!(msg.field("regbus.reg.operating_mode").unwrap().rendered, "run (1)");
        assert_eq!(msg.field("regbus.reg.operating_mode").unwrap().depth, 1);
        let raw = msg.field("regbus.payload").unwrap();
        assert_eq!(raw.range, 8..11);
        assert_eq!(raw.annotations[0], Annotation::UnwalkableField { id: 7 });
    }

    // Test 5: bad checksum
    #[test]
    fn test_bad_checksum() {
        let data = RegBusBuilder::new(message_type::STATUS)
            .sequence(1)
            .payload(vec![0, 0, 0, 0x0E, 0x10])
            .checksum(0x1234)
            .build();
        let mut s = session();
        let d = RegBusProtocol.decode(&data, &ctx(1), &mut s);
        let msg = &d.messages()[0];
        assert!(msg.error.is_none());
        assert_eq!(msg.field("regbus.status.uptime").unwrap().rendered, "3600 s");
        let cks = msg.field("regbus.checksum").unwrap();
        assert!(matches!(cks.annotations[0], Annotation::BadChecksum { received: 0x1234, .. }));
    }

    // Test 6: foreign bytes
    #[test]
    fn test_not_regbus() {
        let mut s = session();
        let d = RegBusProtocol.decode(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05], &ctx(1), &mut s);
        assert!(d.is_not_this_protocol());
    }

    #[test]
    fn test_can_decode() {
        let mut c = ctx(1);
        assert_eq!(RegBusProtocol.can_decode(&c), None);
        c.insert_hint("dst_port", REGBUS_PORT as u64);
        assert_eq!(RegBusProtocol.can_decode(&c), Some(100));
    }

    #[test]
    fn test_message_length() {
        let data = RegBusBuilder::new(message_type::STATUS).payload(vec![0; 5]).build();
        assert_eq!(RegBusProtocol.message_length(&data), Some(13));
        assert_eq!(RegBusProtocol.message_length(&data[..4]), None);
    }

    #[test]
    fn test_schema_has_catalog() {
        let schema = RegBusProtocol.schema_fields();
        assert!(schema.iter().any(|d| d.name == "regbus.reg.diagnostics"));
        assert!(schema.iter().any(|d| d.name == "regbus.checksum"));
    }
}
