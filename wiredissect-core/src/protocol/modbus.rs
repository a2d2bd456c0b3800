//! Modbus/TCP protocol decoder.
//!
//! Each ADU starts with the 7-byte MBAP header (transaction id, protocol id,
//! length, unit id) followed by the function code and its data. Requests and
//! responses share a function code, so the direction of the segment decides
//! which layout applies.
//!
//! Many clients leave the transaction id at zero; those exchanges are paired
//! by position with synthetic ids.

use compact_str::{format_compact, CompactString};

use super::decoder::{
    decode_buffer, BodyContext, DispatchEntry, DispatchTable, Exchange, KeyPolicy, MessageFormat,
    MessageHeader,
};
use super::{Annotation, DecodeContext, Dissection, FieldTree, FieldValue, Protocol, Role};
use crate::correlate::{AnalysisSession, Direction};
use crate::error::DecodeError;
use crate::format::render;
use crate::schema::{DataKind, FieldDescriptor, ProtocolSchema};
use crate::wire::{ByteCursor, Endian};

/// Modbus/TCP port.
pub const MODBUS_PORT: u16 = 502;

/// MBAP bytes in front of the ones its length field counts.
const MBAP_PREFIX_LEN: usize = 6;

/// Bit set in the function code of exception responses.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Modbus function codes.
pub mod function_code {
    pub const READ_COILS: u8 = 1;
    pub const READ_DISCRETE_INPUTS: u8 = 2;
    pub const READ_HOLDING_REGISTERS: u8 = 3;
    pub const READ_INPUT_REGISTERS: u8 = 4;
    pub const WRITE_SINGLE_COIL: u8 = 5;
    pub const WRITE_SINGLE_REGISTER: u8 = 6;
    pub const WRITE_MULTIPLE_COILS: u8 = 15;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 16;
    pub const REPORT_SERVER_ID: u8 = 17;
}

const EXCEPTION_CODES: &[(u64, &str)] = &[
    (0x01, "Illegal Function"),
    (0x02, "Illegal Data Address"),
    (0x03, "Illegal Data Value"),
    (0x04, "Server Device Failure"),
    (0x05, "Acknowledge"),
    (0x06, "Server Device Busy"),
    (0x08, "Memory Parity Error"),
    (0x0A, "Gateway Path Unavailable"),
    (0x0B, "Gateway Target Device Failed to Respond"),
];

fn render_function(value: &FieldValue<'_>) -> Option<CompactString> {
    let fc = value.as_u64()? as u8;
    let name = DISPATCH.name((fc & !EXCEPTION_BIT) as u32)?;
    if fc & EXCEPTION_BIT != 0 {
        Some(format_compact!("{name} exception ({fc:#04x})"))
    } else {
        Some(format_compact!("{name} ({fc})"))
    }
}

fn render_exception(value: &FieldValue<'_>) -> Option<CompactString> {
    render::named(value, EXCEPTION_CODES)
}

fn render_coil_value(value: &FieldValue<'_>) -> Option<CompactString> {
    match value.as_u64()? {
        0xFF00 => Some("ON".into()),
        0x0000 => Some("OFF".into()),
        _ => None,
    }
}

pub static TRANSACTION_ID: FieldDescriptor =
    FieldDescriptor::new("modbus.transaction_id", "Transaction ID", DataKind::UInt16);
pub static PROTOCOL_ID: FieldDescriptor =
    FieldDescriptor::new("modbus.protocol_id", "Protocol ID", DataKind::UInt16);
pub static LENGTH: FieldDescriptor = FieldDescriptor::new("modbus.length", "Length", DataKind::UInt16);
pub static UNIT_ID: FieldDescriptor = FieldDescriptor::new("modbus.unit_id", "Unit ID", DataKind::UInt8);
pub static FUNCTION_CODE: FieldDescriptor =
    FieldDescriptor::new("modbus.function_code", "Function", DataKind::Enum(1)).with_render(render_function);
pub static START_ADDRESS: FieldDescriptor =
    FieldDescriptor::new("modbus.start_address", "Start Address", DataKind::UInt16);
pub static QUANTITY: FieldDescriptor = FieldDescriptor::new("modbus.quantity", "Quantity", DataKind::UInt16);
pub static BYTE_COUNT: FieldDescriptor = FieldDescriptor::new("modbus.byte_count", "Byte Count", DataKind::UInt8);
pub static REGISTER_VALUE: FieldDescriptor =
    FieldDescriptor::new("modbus.register_value", "Register", DataKind::UInt16);
pub static COIL: FieldDescriptor = FieldDescriptor::new("modbus.coil", "Coil", DataKind::Bool);
pub static COIL_BYTES: FieldDescriptor = FieldDescriptor::new("modbus.coil_bytes", "Coil Status", DataKind::Binary)
    .with_description("Packed coil bits, least significant bit first");
pub static OUTPUT_ADDRESS: FieldDescriptor =
    FieldDescriptor::new("modbus.output_address", "Output Address", DataKind::UInt16);
pub static COIL_VALUE: FieldDescriptor =
    FieldDescriptor::new("modbus.coil_value", "Output Value", DataKind::UInt16).with_render(render_coil_value);
pub static OUTPUT_VALUE: FieldDescriptor =
    FieldDescriptor::new("modbus.output_value", "Register Value", DataKind::UInt16);
pub static SERVER_ID: FieldDescriptor = FieldDescriptor::new("modbus.server_id", "Server ID", DataKind::Binary);
pub static EXCEPTION_CODE: FieldDescriptor =
    FieldDescriptor::new("modbus.exception_code", "Exception", DataKind::Enum(1)).with_render(render_exception);
pub static DATA: FieldDescriptor = FieldDescriptor::new("modbus.data", "Data", DataKind::Binary)
    .with_description("Bytes whose layout could not be determined");

/// Opcode of the exception pseudo-entry in the dispatch table.
const EXCEPTION_ENTRY: u32 = EXCEPTION_BIT as u32;

static DISPATCH: DispatchTable = DispatchTable::new(&[
    DispatchEntry::new(function_code::READ_COILS as u32, "Read Coils", decode_read_bits),
    DispatchEntry::new(
        function_code::READ_DISCRETE_INPUTS as u32,
        "Read Discrete Inputs",
        decode_read_bits,
    ),
    DispatchEntry::new(
        function_code::READ_HOLDING_REGISTERS as u32,
        "Read Holding Registers",
        decode_read_registers,
    ),
    DispatchEntry::new(
        function_code::READ_INPUT_REGISTERS as u32,
        "Read Input Registers",
        decode_read_registers,
    ),
    DispatchEntry::new(function_code::WRITE_SINGLE_COIL as u32, "Write Single Coil", decode_write_coil),
    DispatchEntry::new(
        function_code::WRITE_SINGLE_REGISTER as u32,
        "Write Single Register",
        decode_write_register,
    ),
    DispatchEntry::new(
        function_code::WRITE_MULTIPLE_COILS as u32,
        "Write Multiple Coils",
        decode_write_multiple_coils,
    ),
    DispatchEntry::new(
        function_code::WRITE_MULTIPLE_REGISTERS as u32,
        "Write Multiple Registers",
        decode_write_multiple_registers,
    ),
    DispatchEntry::new(function_code::REPORT_SERVER_ID as u32, "Report Server ID", decode_report_server_id),
    DispatchEntry::new(EXCEPTION_ENTRY, "Exception", decode_exception),
]);

/// `(start, quantity)` stored by the request this response answers.
fn requested_range(body: &BodyContext) -> Option<(u16, u16)> {
    match body.request_params.as_deref()? {
        [start, quantity, ..] => Some((*start as u16, *quantity as u16)),
        _ => None,
    }
}

fn unknown_direction<'a>(cur: &mut ByteCursor<'a>, tree: &mut FieldTree<'a>) -> Result<(), DecodeError> {
    tree.opaque(cur, &DATA, Annotation::ContextDependent { reason: "message direction" });
    Ok(())
}

/// `{start, quantity}`; the pair is kept for the response.
fn decode_range_request<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(u16, u16), DecodeError> {
    let start = tree.read_u16(cur, &START_ADDRESS, Endian::Big)?;
    let quantity = tree.read_u16(cur, &QUANTITY, Endian::Big)?;
    body.params.push(start as u32);
    body.params.push(quantity as u32);
    Ok((start, quantity))
}

/// Byte count followed by exactly that many data bytes.
fn counted_data<'a>(cur: &mut ByteCursor<'a>, tree: &mut FieldTree<'a>) -> Result<ByteCursor<'a>, DecodeError> {
    let count = tree.read_u8(cur, &BYTE_COUNT)? as usize;
    let data = cur.bounded(count).map_err(|e| e.in_field("modbus", DATA.name))?;
    cur.skip(count).map_err(|e| e.in_field("modbus", DATA.name))?;
    Ok(data)
}

fn decode_read_registers<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    match body.role {
        Some(Role::Request) => decode_range_request(cur, tree, body).map(|_| ()),
        Some(Role::Response) => {
            let mut data = counted_data(cur, tree)?;
            let range = requested_range(body);
            if range.is_none() {
                body.annotations.push(Annotation::ContextDependent {
                    reason: "register numbering depends on request",
                });
            }
            let mut index = 0u32;
            while data.remaining() >= 2 {
                let value = tree.read_u16(&mut data, &REGISTER_VALUE, Endian::Big)?;
                if let Some((start, _)) = range {
                    if let Some(field) = tree.last_mut() {
                        field.rendered = format_compact!("Register {}: {value}", start as u32 + index);
                    }
                }
                index += 1;
            }
            if !data.is_empty() {
                let count = data.remaining();
                tree.opaque(&mut data, &DATA, Annotation::TrailingBytes { count });
            }
            Ok(())
        }
        None => unknown_direction(cur, tree),
    }
}

fn decode_read_bits<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    match body.role {
        Some(Role::Request) => decode_range_request(cur, tree, body).map(|_| ()),
        Some(Role::Response) => {
            let mut data = counted_data(cur, tree)?;
            let Some((start, quantity)) = requested_range(body) else {
                tree.read_value(&mut data, &COIL_BYTES, Endian::Big)?;
                tree.annotate_last(Annotation::ContextDependent {
                    reason: "coil numbering depends on request",
                });
                return Ok(());
            };
            let base = data.position();
            let bytes = data.take_rest();
            let shown = (quantity as usize).min(bytes.len() * 8);
            for i in 0..shown {
                let on = (bytes[i / 8] >> (i % 8)) & 1 == 1;
                let at = base + i / 8;
                tree.push(&COIL, at..at + 1, FieldValue::Bool(on)).rendered =
                    format_compact!("Coil {}: {}", start as usize + i, if on { "ON" } else { "OFF" });
            }
            Ok(())
        }
        None => unknown_direction(cur, tree),
    }
}

/// Request and response are identical: address and value.
fn decode_write_coil<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    tree.read_u16(cur, &OUTPUT_ADDRESS, Endian::Big)?;
    tree.read_u16(cur, &COIL_VALUE, Endian::Big)?;
    Ok(())
}

fn decode_write_register<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    tree.read_u16(cur, &OUTPUT_ADDRESS, Endian::Big)?;
    tree.read_u16(cur, &OUTPUT_VALUE, Endian::Big)?;
    Ok(())
}

/// `{start, quantity, byte_count, data}` with the byte count checked
/// against both the quantity and the bytes present.
fn write_multiple_header<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
    bytes_for: fn(u16) -> usize,
) -> Result<(u16, ByteCursor<'a>), DecodeError> {
    let (start, quantity) = decode_range_request(cur, tree, body)?;
    let byte_count = tree.read_u8(cur, &BYTE_COUNT)? as usize;
    if byte_count != bytes_for(quantity) {
        return Err(DecodeError::InvalidField {
            protocol: "modbus",
            field: BYTE_COUNT.name,
            reason: format!("byte count {byte_count} does not match quantity {quantity}"),
        });
    }
    let data = cur
        .bounded(byte_count)
        .map_err(|e| e.in_field("modbus", DATA.name))?;
    cur.skip(byte_count).map_err(|e| e.in_field("modbus", DATA.name))?;
    if !cur.is_empty() {
        return Err(DecodeError::InvalidField {
            protocol: "modbus",
            field: BYTE_COUNT.name,
            reason: format!(
                "byte count {byte_count} but {} data bytes present",
                byte_count + cur.remaining()
            ),
        });
    }
    Ok((start, data))
}

fn decode_write_multiple_registers<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    match body.role {
        Some(Role::Request) => {
            let (start, mut data) = write_multiple_header(cur, tree, body, |q| q as usize * 2)?;
            let mut address = start as u32;
            while !data.is_empty() {
                let value = tree.read_u16(&mut data, &REGISTER_VALUE, Endian::Big)?;
                if let Some(field) = tree.last_mut() {
                    field.rendered = format_compact!("Register {address}: {value}");
                }
                address += 1;
            }
            Ok(())
        }
        Some(Role::Response) => decode_range_request(cur, tree, body).map(|_| ()),
        None => unknown_direction(cur, tree),
    }
}

fn decode_write_multiple_coils<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    match body.role {
        Some(Role::Request) => {
            let (_, mut data) = write_multiple_header(cur, tree, body, |q| (q as usize).div_ceil(8))?;
            tree.read_value(&mut data, &COIL_BYTES, Endian::Big)?;
            Ok(())
        }
        Some(Role::Response) => decode_range_request(cur, tree, body).map(|_| ()),
        None => unknown_direction(cur, tree),
    }
}

fn decode_report_server_id<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    body: &mut BodyContext,
) -> Result<(), DecodeError> {
    match body.role {
        // The request has no data.
        Some(Role::Request) => Ok(()),
        Some(Role::Response) => {
            let mut data = counted_data(cur, tree)?;
            tree.read_value(&mut data, &SERVER_ID, Endian::Big)?;
            Ok(())
        }
        None => unknown_direction(cur, tree),
    }
}

fn decode_exception<'a>(
    cur: &mut ByteCursor<'a>,
    tree: &mut FieldTree<'a>,
    _body: &mut BodyContext,
) -> Result<(), DecodeError> {
    tree.read_u8(cur, &EXCEPTION_CODE)?;
    Ok(())
}

/// Modbus/TCP protocol decoder.
#[derive(Debug, Clone, Copy)]
pub struct ModbusProtocol;

impl MessageFormat for ModbusProtocol {
    fn name(&self) -> &'static str {
        "modbus"
    }

    fn read_header<'a>(
        &self,
        cur: &mut ByteCursor<'a>,
        tree: &mut FieldTree<'a>,
    ) -> Result<MessageHeader, DecodeError> {
        let protocol_id = cur
            .slice(cur.position() + 2, 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .map_err(|e| e.in_field("modbus", PROTOCOL_ID.name))?;
        if protocol_id != 0 {
            return Err(DecodeError::UnknownMagic {
                protocol: "modbus",
                found: protocol_id as u64,
            });
        }

        let transaction_id = tree.read_u16(cur, &TRANSACTION_ID, Endian::Big)?;
        tree.read_u16(cur, &PROTOCOL_ID, Endian::Big)?;
        let length = tree.read_u16(cur, &LENGTH, Endian::Big)?;
        if length < 2 {
            return Err(DecodeError::InvalidField {
                protocol: "modbus",
                field: LENGTH.name,
                reason: format!("length {length} leaves no room for unit id and function code"),
            });
        }
        tree.read_u8(cur, &UNIT_ID)?;
        let function = tree.read_u8(cur, &FUNCTION_CODE)?;

        Ok(MessageHeader {
            opcode: function as u32,
            transaction_id: Some(transaction_id as u32),
            payload_len: length as usize - 2,
            trailer_len: 0,
        })
    }

    fn dispatch(&self) -> &DispatchTable {
        &DISPATCH
    }

    fn select(&self, header: &MessageHeader, _body: &BodyContext) -> Option<&'static DispatchEntry> {
        if header.opcode & EXCEPTION_ENTRY != 0 {
            DISPATCH.find(EXCEPTION_ENTRY)
        } else {
            DISPATCH.find(header.opcode)
        }
    }

    fn exchange(&self, header: &MessageHeader, direction: Direction) -> Option<Exchange> {
        let function = header.opcode & !EXCEPTION_ENTRY;
        match direction {
            Direction::ToServer => Some(Exchange::request(function)),
            Direction::ToClient => Some(Exchange::response(function)),
            Direction::Unknown => None,
        }
    }

    fn key_policy(&self) -> KeyPolicy {
        KeyPolicy::SyntheticWhenZero
    }

    fn opaque_descriptor(&self) -> &'static FieldDescriptor {
        &DATA
    }

    fn summary_fields(&self) -> &'static [&'static str] {
        &["modbus.unit_id"]
    }

    fn frame_length(&self, data: &[u8]) -> Option<usize> {
        let prefix = data.get(..MBAP_PREFIX_LEN)?;
        let length = u16::from_be_bytes([prefix[4], prefix[5]]) as usize;
        Some(MBAP_PREFIX_LEN + length)
    }
}

impl Protocol for ModbusProtocol {
    fn name(&self) -> &'static str {
        "modbus"
    }

    fn display_name(&self) -> &'static str {
        "Modbus/TCP"
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        context.has_port(MODBUS_PORT).then_some(100)
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
        vec![
            &TRANSACTION_ID,
            &PROTOCOL_ID,
            &LENGTH,
            &UNIT_ID,
            &FUNCTION_CODE,
            &START_ADDRESS,
            &QUANTITY,
            &BYTE_COUNT,
            &REGISTER_VALUE,
            &COIL,
            &COIL_BYTES,
            &OUTPUT_ADDRESS,
            &COIL_VALUE,
            &OUTPUT_VALUE,
            &SERVER_ID,
            &EXCEPTION_CODE,
            &DATA,
        ]
    }

    fn default_port(&self) -> Option<u16> {
        Some(MODBUS_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{ConversationId, MessageRef, SessionConfig, TransactionId};
    use crate::protocol::test_utils::ModbusBuilder;

    fn session() -> AnalysisSession {
        AnalysisSession::new(SessionConfig::default())
    }

    fn request(frame: u64) -> DecodeContext {
        DecodeContext::new(ConversationId(7), frame).with_direction(Direction::ToServer)
    }

    fn response(frame: u64) -> DecodeContext {
        DecodeContext::new(ConversationId(7), frame).with_direction(Direction::ToClient)
    }

    fn rendered<'m>(msg: &'m crate::protocol::DecodedMessage<'_>, name: &str) -> Vec<&'m str> {
        msg.fields
            .iter()
            .filter(|f| f.name() == name)
            .map(|f| f.rendered.as_str())
            .collect()
    }

    // Test 1: read holding registers, numbered from the request
    #[test]
    fn test_read_holding_registers() {
        let mut s = session();
        let req = ModbusBuilder::new(function_code::READ_HOLDING_REGISTERS)
            .transaction_id(1)
            .data(vec![0x00, 0x64, 0x00, 0x02])
            .build();
        let resp = ModbusBuilder::new(function_code::READ_HOLDING_REGISTERS)
            .transaction_id(1)
            .data(vec![0x04, 0x00, 0x2A, 0x00, 0x07])
            .build();

        let d = ModbusProtocol.decode(&req, &request(1), &mut s);
        let msg = &d.messages()[0];
        assert_eq!(msg.type_name, Some("Read Holding Registers"));
        assert_eq!(msg.field("modbus.function_code").unwrap().rendered, "Read Holding Registers (3)");
        assert_eq!(msg.transaction_id, Some(TransactionId::Wire(1)));

        let d = ModbusProtocol.decode(&resp, &response(2), &mut s);
        let msg = &d.messages()[0];
        assert!(msg.error.is_none());
        assert_eq!(rendered(msg, "modbus.register_value"), vec!["Register 100: 42", "Register 101: 7"]);
        assert_eq!(msg.correlation.as_ref().unwrap().peer, Some(MessageRef::new(1, 0)));
    }

    // Test 2: a response with no request shows bare values
    #[test]
    fn test_response_without_request() {
        let resp = ModbusBuilder::new(function_code::READ_INPUT_REGISTERS)
            .transaction_id(9)
            .data(vec![0x02, 0x01, 0x00])
            .build();
        let mut s = session();
        let d = ModbusProtocol.decode(&resp, &response(1), &mut s);
        let msg = &d.messages()[0];
        assert_eq!(rendered(msg, "modbus.register_value"), vec!["256"]);
        assert!(msg.annotations.contains(&Annotation::ContextDependent {
            reason: "register numbering depends on request"
        }));
        assert!(msg.correlation.is_none());
    }

    // Test 3: exception responses
    #[test]
    fn test_exception_response() {
        let mut s = session();
        let req = ModbusBuilder::new(function_code::READ_COILS)
            .transaction_id(4)
            .data(vec![0x00, 0x00, 0x00, 0x08])
            .build();
        let exc = ModbusBuilder::new(function_code::READ_COILS | EXCEPTION_BIT)
            .transaction_id(4)
            .data(vec![0x02])
            .build();
        ModbusProtocol.decode(&req, &request(1), &mut s);
        let d = ModbusProtocol.decode(&exc, &response(2), &mut s);
        let msg = &d.messages()[0];
        assert_eq!(msg.type_name, Some("Exception"));
        assert_eq!(msg.field("modbus.function_code").unwrap().rendered, "Read Coils exception (0x81)");
        assert_eq!(msg.field("modbus.exception_code").unwrap().rendered, "Illegal Data Address (2)");
        assert!(msg.correlation.is_some());
    }

    // Test 4: byte count inconsistent with quantity
    #[test]
    fn test_write_multiple_byte_count_mismatch() {
        let adu = ModbusBuilder::new(function_code::WRITE_MULTIPLE_REGISTERS)
            .transaction_id(2)
            .data(vec![0x00, 0x01, 0x00, 0x02, 0x02, 0x00, 0x0A])
            .build();
        let mut s = session();
        let d = ModbusProtocol.decode(&adu, &request(1), &mut s);
        assert!(matches!(
            d.error(),
            Some(DecodeError::InvalidField { field: "modbus.byte_count", .. })
        ));
        let msg = &d.messages()[0];
        assert!(msg.is_malformed());
        assert!(msg.field("modbus.quantity").is_some());
        assert!(s.correlator().is_empty());
    }

    #[test]
    fn test_write_multiple_registers() {
        let adu = ModbusBuilder::new(function_code::WRITE_MULTIPLE_REGISTERS)
            .transaction_id(2)
            .data(vec![0x00, 0x0A, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02])
            .build();
        let mut s = session();
        let d = ModbusProtocol.decode(&adu, &request(1), &mut s);
        assert!(d.error().is_none());
        assert_eq!(
            rendered(&d.messages()[0], "modbus.register_value"),
            vec!["Register 10: 1", "Register 11: 2"]
        );
    }

    // Test 5: zero transaction ids pair up by position
    #[test]
    fn test_synthetic_ids() {
        let mut s = session();
        let req_a = ModbusBuilder::new(function_code::READ_HOLDING_REGISTERS)
            .data(vec![0x00, 0x00, 0x00, 0x01])
            .build();
        let req_b = ModbusBuilder::new(function_code::READ_HOLDING_REGISTERS)
            .data(vec![0x00, 0x10, 0x00, 0x01])
            .build();
        let resp = ModbusBuilder::new(function_code::READ_HOLDING_REGISTERS)
            .data(vec![0x02, 0x00, 0x05])
            .build();

        ModbusProtocol.decode(&req_a, &request(1), &mut s);
        ModbusProtocol.decode(&req_b, &request(2), &mut s);
        let first = ModbusProtocol.decode(&resp, &response(3), &mut s);
        let second = ModbusProtocol.decode(&resp, &response(4), &mut s);

        let first = &first.messages()[0];
        let second = &second.messages()[0];
        assert!(first.transaction_id.unwrap().is_synthetic());
        assert_eq!(first.correlation.as_ref().unwrap().peer, Some(MessageRef::new(1, 0)));
        assert_eq!(second.correlation.as_ref().unwrap().peer, Some(MessageRef::new(2, 0)));
        assert_eq!(rendered(second, "modbus.register_value"), vec!["Register 16: 5"]);
    }

    // Test 6: two ADUs in one segment, then an unknown function
    #[test]
    fn test_multiple_adus_and_unknown_function() {
        let mut data = ModbusBuilder::new(function_code::WRITE_SINGLE_COIL)
            .transaction_id(1)
            .data(vec![0x00, 0x03, 0xFF, 0x00])
            .build();
        data.extend(ModbusBuilder::new(0x41).transaction_id(2).data(vec![1, 2, 3]).build());
        let mut s = session();
        let d = ModbusProtocol.decode(&data, &request(1), &mut s);
        let msgs = d.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].field("modbus.coil_value").unwrap().rendered, "ON");
        let raw = msgs[1].field("modbus.data").unwrap();
        assert_eq!(raw.annotations[0], Annotation::UnknownOpcode { opcode: 0x41 });
        assert_eq!(raw.range, 20..23);
    }

    #[test]
    fn test_not_modbus() {
        let data = ModbusBuilder::new(3).protocol_id(0x1234).data(vec![0, 0, 0, 1]).build();
        let mut s = session();
        assert!(ModbusProtocol.decode(&data, &request(1), &mut s).is_not_this_protocol());
    }

    #[test]
    fn test_message_length() {
        let data = ModbusBuilder::new(3).data(vec![0, 0, 0, 1]).build();
        assert_eq!(ModbusProtocol.message_length(&data[..6]), Some(12));
        assert_eq!(ModbusProtocol.message_length(&data[..5]), None);
    }

    #[test]
    fn test_read_coils_response() {
        let mut s = session();
        let req = ModbusBuilder::new(function_code::READ_COILS)
            .transaction_id(3)
            .data(vec![0x00, 0x14, 0x00, 0x03])
            .build();
        let resp = ModbusBuilder::new(function_code::READ_COILS)
            .transaction_id(3)
            .data(vec![0x01, 0b0000_0101])
            .build();
        ModbusProtocol.decode(&req, &request(1), &mut s);
        let d = ModbusProtocol.decode(&resp, &response(2), &mut s);
        assert_eq!(
            rendered(&d.messages()[0], "modbus.coil"),
            vec!["Coil 20: ON", "Coil 21: OFF", "Coil 22: ON"]
        );
    }
}
