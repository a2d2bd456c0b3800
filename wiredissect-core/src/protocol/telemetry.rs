//! Telemetry datagram decoder.
//!
//! Layout:
//!
//! ```text
//! magic u8 | version:4 type:4 | body_length varint | body | crc16
//! body = presence u8, announced fields in bit order, TLV options
//! ```
//!
//! The options use one `{type u8, length u8}` header for most tags; padding
//! and end markers carry no length, vendor options put an enterprise number
//! in front of a 2-byte length, and bulk options use a 2-byte length.

use compact_str::{format_compact, CompactString};

use super::decoder::{
    decode_buffer, BodyContext, ChecksumSpec, DispatchEntry, DispatchTable, Exchange, MessageFormat,
    MessageHeader,
};
use super::{decode_fixed, Annotation, DecodeContext, Dissection, FieldTree, FieldValue, Protocol};
use crate::correlate::{AnalysisSession, Direction};
use crate::error::DecodeError;
use crate::format::render;
use crate::schema::{DataKind, FieldCatalog, FieldDescriptor, ProtocolSchema};
use crate::wire::{
    present_fields, read_vle, unknown_bits, ByteCursor, ChecksumAlgorithm, Endian, PresenceBinding,
    TlvHeader, TlvIter, TlvScheme,
};

/// Telemetry UDP port.
pub const TELEMETRY_PORT: u16 = 7400;

pub const MAGIC_V1: u8 = 0xA7;
pub const MAGIC_V2: u8 = 0xA8;

/// Telemetry message types.
pub mod message_type {
    pub const DATA: u8 = 1;
    pub const EVENT: u8 = 2;
    pub const HEARTBEAT: u8 = 3;
    pub const CONFIG_GET: u8 = 4;
    pub const CONFIG_REPLY: u8 = 5;
}

/// Option tags.
pub mod option {
    pub const PAD: u8 = 0x00;
    pub const TEMPERATURE: u8 = 0x01;
    pub const HUMIDITY: u8 = 0x02;
    pub const BATTERY_MV: u8 = 0x03;
    pub const LABEL: u8 = 0x04;
    pub const PEER_ADDRESS: u8 = 0x05;
    pub const FIRMWARE: u8 = 0x06;
    pub const BULK: u8 = 0xFD;
    pub const VENDOR: u8 = 0xFE;
    pub const END: u8 = 0xFF;
}

const OPTION_HEADERS: &[(u32, TlvHeader)] = &[
    (option::PAD as u32, TlvHeader::tag_only(1)),
    (option::END as u32, TlvHeader::tag_only(1)),
    (option::VENDOR as u32, TlvHeader::shifted(1, 4, 2)),
    (option::BULK as u32, TlvHeader::standard(1, 2)),
];

const OPTIONS: TlvScheme = TlvScheme {
    type_width: 1,
    endian: Endian::Big,
    default: TlvHeader::standard(1, 1),
    overrides: OPTION_HEADERS,
    terminator: Some(option::END as u32),
};

fn render_magic(value: &FieldValue<'_>) -> Option<CompactString> {
    match value.as_u64()? as u8 {
        MAGIC_V1 => Some("v1 (0xa7)".into()),
        MAGIC_V2 => Some("v2 (0xa8)".into()),
        _ => None,
    }
}

fn render_type(value: &FieldValue<'_>) -> Option<CompactString> {
    let t = value.as_u64()?;
    DISPATCH.name(t as u32).map(|name| format_compact!("{name} ({t})"))
}

fn render_timestamp(value: &FieldValue<'_>) -> Option<CompactString> {
    let us = value.as_u64()?;
    Some(format_compact!("{}.{:06}", us / 1_000_000, us % 1_000_000))
}

fn render_temperature(value: &FieldValue<'_>) -> Option<CompactString> {
    render::scaled(value, 10, "C")
}

fn render_humidity(value: &FieldValue<'_>) -> Option<CompactString> {
    render::scaled(value, 1, "%")
}

fn render_millivolts(value: &FieldValue<'_>) -> Option<CompactString> {
    render::scaled(value, 1, "mV")
}

pub static MAGIC: FieldDescriptor =
    FieldDescriptor::new("telemetry.magic", "Magic", DataKind::UInt8).with_render(render_magic);
pub static VERSION: FieldDescriptor = FieldDescriptor::new("telemetry.version", "Version", DataKind::UInt8);
pub static TYPE: FieldDescriptor =
    FieldDescriptor::new("telemetry.type", "Type", DataKind::UInt8).with_render(render_type);
pub static BODY_LENGTH: FieldDescriptor =
    FieldDescriptor::new("telemetry.body_length", "Body Length", DataKind::UInt32);
pub static PRESENCE: FieldDescriptor =
    FieldDescriptor::new("telemetry.presence", "Presence", DataKind::UInt8).with_render(render::hex);
pub static TIMESTAMP: FieldDescriptor =
    FieldDescriptor::new("telemetry.timestamp", "Timestamp", DataKind::UInt64).with_render(render_timestamp);
pub static SEQUENCE: FieldDescriptor = FieldDescriptor::new("telemetry.sequence", "Sequence", DataKind::UInt32);
pub static SOURCE_ID: FieldDescriptor =
    FieldDescriptor::new("telemetry.source_id", "Source ID", DataKind::UInt16).with_render(render::hex);
pub static SENSOR_ADDRESS: FieldDescriptor =
    FieldDescriptor::new("telemetry.sensor_address", "Sensor Address", DataKind::Ipv4);
pub static GATEWAY: FieldDescriptor = FieldDescriptor::new("telemetry.gateway", "Gateway", DataKind::Mac);
pub static PAD: FieldDescriptor = FieldDescriptor::new("telemetry.option.pad", "Padding", DataKind::UInt8);
pub static END: FieldDescriptor = FieldDescriptor::new("telemetry.option.end", "End of Options", DataKind::UInt8);
pub static ENTERPRISE: FieldDescriptor =
    FieldDescriptor::new("telemetry.option.enterprise", "Enterprise", DataKind::UInt32);
pub static UNKNOWN_OPTION: FieldDescriptor =
    FieldDescriptor::new("telemetry.option.unknown", "Unknown Option", DataKind::Binary);
pub static PAYLOAD: FieldDescriptor = FieldDescriptor::new("telemetry.payload", "Payload", DataKind::Binary);
pub static CRC: FieldDescriptor =
    FieldDescriptor::new("telemetry.crc", "CRC", DataKind::UInt16).with_render(render::hex);

static PRESENCE_BINDINGS: &[PresenceBinding] = &[
    PresenceBinding::new(0, 8, &TIMESTAMP),
    PresenceBinding::new(1, 4, &SEQUENCE),
    PresenceBinding::new(2, 2, &SOURCE_ID),
    PresenceBinding::new(3, 4, &SENSOR_ADDRESS),
    PresenceBinding::new(4, 6, &GATEWAY),
];

/// Option catalog, keyed by tag.
pub static OPTION_CATALOG: FieldCatalog<u8> = FieldCatalog::new(
    "telemetry.options",
    &[
        (
            option::TEMPERATURE,
            FieldDescriptor::new("telemetry.option.temperature", "Temperature", DataKind::UInt16)
                .with_render(render_temperature),
        ),
        (
            option::HUMIDITY,
            FieldDescriptor::new("telemetry.option.humidity", "Humidity", DataKind::UInt8)
                .with_render(render_humidity),
        ),
        (
            option::BATTERY_MV,
            FieldDescriptor::new("telemetry.option.battery_mv", "Battery", DataKind::UInt16)
                .with_render(render_millivolts),
        ),
        (
            option::LABEL,
            FieldDescriptor::new("telemetry.option.label", "Label", DataKind::String),
        ),
        (
            option::PEER_ADDRESS,
            FieldDescriptor::new("telemetry.option.peer_address", "Peer Address", DataKind::Ipv4),
        ),
        (
            option::FIRMWARE,
            FieldDescriptor::new("telemetry.option.firmware", "Firmware", DataKind::String),
        ),
        (
            option::BULK,
            FieldDescriptor::new("telemetry.option.bulk", "Bulk Data", DataKind::Binary),
        ),
        (
            option::VENDOR,
            FieldDescriptor::new("telemetry.option.vendor", "Vendor Data", DataKind::Binary),
        ),
    ],
);

static DISPATCH: DispatchTable = DispatchTable::new(&[
    DispatchEntry::new(message_type::DATA as u32, "DATA", decode_report),
    DispatchEntry::new(message_type::EVENT as u32, "EVENT", decode_report),
    DispatchEntry::new(message_type::HEARTBEAT as u32, "HEARTBEAT", decode_heartbeat),
    DispatchEntry::new(message_type::CONFIG_GET as u32, "CONFIG_GET", decode_config_get),
    DispatchEntry::new(message_type::CONFIG_REPLY as u32, "CONFIG_REPLY", decode_config_reply),
]);

/// Presence mask and the fields it announces.
fn decode_presence<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
) -> Result<(), DecodeError> {
    let mask = tree.read_u8(cur, &PRESENCE)? as u64;
    let unknown = unknown_bits(mask, PRESENCE_BINDINGS);
    if unknown != 0 {
        tree.annotate_last(Annotation::UnknownPresenceBits { bits: unknown });
    }

    for field in present_fields(mask, PRESENCE_BINDINGS, cur) {
        let field = field.map_err(|missing| missing.error.in_field("telemetry", missing.binding.descriptor.name))?;
        let desc = field.binding.descriptor;
        let value = decode_fixed(desc.kind, field.bytes, Endian::Big);
        tree.push(desc, field.offset..field.offset + field.bytes.len(), value);
    }
    Ok(())
}

/// TLV options up to the end marker or the end of the body. Returns the
/// tags seen.
fn decode_options<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &BodyContext,
) -> Result<Vec<u8>, DecodeError> {
    let mut tags = Vec::new();
    let mut iter = TlvIter::new(*cur, OPTIONS).with_limit(body.max_tlv_entries);
    for entry in iter.by_ref() {
        let entry = entry.map_err(|e| e.in_field("telemetry", UNKNOWN_OPTION.name))?;
        let tag = entry.tag as u8;
        tags.push(tag);
        match tag {
            option::PAD => {
                tree.push(&PAD, entry.range(), FieldValue::UInt8(tag));
            }
            option::END => {
                tree.push(&END, entry.range(), FieldValue::UInt8(tag));
            }
            _ => match OPTION_CATALOG.find(tag) {
                Some(desc) => {
                    let value = decode_fixed(desc.kind, entry.value, Endian::Big);
                    tree.push(desc, entry.range(), value);
                    if tag == option::VENDOR {
                        let prefix = entry.header_prefix(OPTIONS.type_width);
                        let at = entry.offset + OPTIONS.type_width;
                        let enterprise = decode_fixed(ENTERPRISE.kind, prefix, Endian::Big);
                        tree.nested(|t| {
                            t.push(&ENTERPRISE, at..at + prefix.len(), enterprise);
                        });
                    }
                }
                None => {
                    tree.push(&UNKNOWN_OPTION, entry.range(), FieldValue::Bytes(entry.value))
                        .annotations
                        .push(Annotation::UnknownField { id: entry.tag });
                }
            },
        }
    }
    cur.seek(iter.position())
        .map_err(|e| e.in_field("telemetry", UNKNOWN_OPTION.name))?;
    Ok(tags)
}

fn decode_report<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    decode_presence(cur, tree)?;
    decode_options(cur, tree, body)?;
    Ok(())
}

/// A report whose options are checked against the tags the request named.
fn decode_config_reply<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    decode_presence(cur, tree)?;
    let first_option = tree.len();
    decode_options(cur, tree, body)?;
    let Some(requested) = body.request_params.as_deref() else {
        return Ok(());
    };
    for field in tree.fields_mut()[first_option..].iter_mut().filter(|f| f.depth == 0) {
        let tag = OPTION_CATALOG
            .iter()
            .find(|(_, d)| std::ptr::eq(*d, field.descriptor))
            .map(|(tag, _)| tag as u32);
        if let Some(tag) = tag.filter(|t| !requested.contains(t)) {
            field.annotations.push(Annotation::Unrequested { id: tag });
        }
    }
    Ok(())
}

fn decode_heartbeat<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    decode_presence(cur, tree)
}

/// The options name the settings asked for; the tags are kept for the reply.
fn decode_config_get<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    decode_presence(cur, tree)?;
    let tags = decode_options(cur, tree, body)?;
    body.params
        .extend(tags.into_iter().filter(|t| OPTION_CATALOG.find(*t).is_some()).map(u32::from));
    Ok(())
}

/// Sequence number announced in the body, read ahead so the correlation
/// key is known before the body is decoded.
fn peek_sequence(cur: &ByteCursor<'_>, body_length: usize) -> Option<u32> {
    let mut view = cur.clamped(cur.position().saturating_add(body_length));
    let mask = view.read_u8().ok()? as u64;
    present_fields(mask, PRESENCE_BINDINGS, &mut view)
        .map_while(Result::ok)
        .find(|f| std::ptr::eq(f.binding.descriptor, &SEQUENCE))
        .and_then(|f| decode_fixed(SEQUENCE.kind, f.bytes, Endian::Big).as_u64())
        .map(|v| v as u32)
}

/// Telemetry protocol decoder.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryProtocol;

impl MessageFormat for TelemetryProtocol {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn read_header<'a>(
        &self,
        cur: &mut ByteCursor<'a>,
        tree: &mut FieldTree<'a>,
    ) -> Result<MessageHeader, DecodeError> {
        let magic = cur.peek_u8().map_err(|e| e.in_field("telemetry", MAGIC.name))?;
        if magic != MAGIC_V1 && magic != MAGIC_V2 {
            return Err(DecodeError::UnknownMagic {
                protocol: "telemetry",
                found: magic as u64,
            });
        }
        tree.read_u8(cur, &MAGIC)?;

        // version and type share one byte
        let at = cur.position();
        let bit = at * 8;
        let version = cur.read_bits(bit, 4).map_err(|e| e.in_field("telemetry", VERSION.name))?;
        let msg_type = cur.read_bits(bit + 4, 4).map_err(|e| e.in_field("telemetry", TYPE.name))?;
        cur.skip(1).map_err(|e| e.in_field("telemetry", TYPE.name))?;
        tree.push(&VERSION, at..at + 1, FieldValue::UInt8(version as u8));
        tree.push(&TYPE, at..at + 1, FieldValue::UInt8(msg_type as u8));

        let at = cur.position();
        let (body_length, width) = read_vle(cur).map_err(|e| e.in_field("telemetry", BODY_LENGTH.name))?;
        tree.push(&BODY_LENGTH, at..at + width, FieldValue::UInt32(body_length));

        Ok(MessageHeader {
            opcode: msg_type,
            transaction_id: peek_sequence(cur, body_length as usize),
            payload_len: body_length as usize,
            trailer_len: ChecksumAlgorithm::Crc16Ccitt.width(),
        })
    }

    fn dispatch(&self) -> &DispatchTable {
        &DISPATCH
    }

    fn checksum(&self) -> Option<ChecksumSpec> {
        Some(ChecksumSpec {
            algorithm: ChecksumAlgorithm::Crc16Ccitt,
            endian: Endian::Big,
            descriptor: &CRC,
        })
    }

    fn exchange(&self, header: &MessageHeader, _direction: Direction) -> Option<Exchange> {
        match header.opcode as u8 {
            message_type::CONFIG_GET => Some(Exchange::request(message_type::CONFIG_REPLY as u32)),
            message_type::CONFIG_REPLY => Some(Exchange::response(message_type::CONFIG_REPLY as u32)),
            _ => None,
        }
    }

    fn opaque_descriptor(&self) -> &'static FieldDescriptor {
        &PAYLOAD
    }

    fn summary_fields(&self) -> &'static [&'static str] {
        &["telemetry.source_id", "telemetry.sequence"]
    }
}

impl Protocol for TelemetryProtocol {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn display_name(&self) -> &'static str {
        "Telemetry"
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        context.has_port(TELEMETRY_PORT).then_some(100)
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
            &VERSION,
            &TYPE,
            &BODY_LENGTH,
            &PRESENCE,
        ];
        fields.extend(PRESENCE_BINDINGS.iter().map(|b| b.descriptor));
        fields.extend([&PAD, &END, &ENTERPRISE, &UNKNOWN_OPTION]);
        fields.extend(OPTION_CATALOG.iter().map(|(_, d)| d));
        fields.push(&PAYLOAD);
        fields.push(&CRC);
        fields
    }

    fn default_port(&self) -> Option<u16> {
        Some(TELEMETRY_PORT)
    }
}
