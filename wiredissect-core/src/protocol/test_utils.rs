//! Test utilities for protocol decoding.
//!
//! Provides builders for constructing test messages and helper functions
//! for inspecting decode results.

use crate::wire::checksum::{crc16_ccitt, masked_ones_complement16};
use crate::wire::encode_vle;

use super::DecodedMessage;

/// Builder for RegBus messages. Length and checksum are filled in on build
/// unless overridden.
#[derive(Debug, Clone)]
pub struct RegBusBuilder {
    magic: u16,
    msg_type: u8,
    sequence: u8,
    length: Option<u16>,
    payload: Vec<u8>,
    checksum: Option<u16>,
}

impl RegBusBuilder {
    pub fn new(msg_type: u8) -> Self {
        Self {
            magic: super::regbus::MAGIC_V1,
            msg_type,
            sequence: 0,
            length: None,
            payload: Vec::new(),
            checksum: None,
        }
    }

    pub fn magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    pub fn sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn length(mut self, length: u16) -> Self {
        self.length = Some(length);
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn checksum(mut self, checksum: u16) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = self.length.unwrap_or(self.payload.len() as u16);
        let mut msg = Vec::with_capacity(8 + self.payload.len());
        msg.extend_from_slice(&self.magic.to_be_bytes());
        msg.push(self.msg_type);
        msg.push(self.sequence);
        msg.extend_from_slice(&length.to_be_bytes());
        msg.extend_from_slice(&self.payload);
        let checksum = self.checksum.unwrap_or_else(|| masked_ones_complement16(&msg));
        msg.extend_from_slice(&checksum.to_be_bytes());
        msg
    }
}

/// Builder for Modbus/TCP ADUs.
#[derive(Debug, Clone)]
pub struct ModbusBuilder {
    transaction_id: u16,
    protocol_id: u16,
    unit_id: u8,
    function_code: u8,
    length: Option<u16>,
    data: Vec<u8>,
}

impl ModbusBuilder {
    pub fn new(function_code: u8) -> Self {
        Self {
            transaction_id: 0,
            protocol_id: 0,
            unit_id: 1,
            function_code,
            length: None,
            data: Vec::new(),
        }
    }

    pub fn transaction_id(mut self, id: u16) -> Self {
        self.transaction_id = id;
        self
    }

    pub fn protocol_id(mut self, id: u16) -> Self {
        self.protocol_id = id;
        self
    }

    pub fn unit_id(mut self, unit: u8) -> Self {
        self.unit_id = unit;
        self
    }

    pub fn length(mut self, length: u16) -> Self {
        self.length = Some(length);
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = self.length.unwrap_or(2 + self.data.len() as u16);
        let mut adu = Vec::with_capacity(8 + self.data.len());
        adu.extend_from_slice(&self.transaction_id.to_be_bytes());
        adu.extend_from_slice(&self.protocol_id.to_be_bytes());
        adu.extend_from_slice(&length.to_be_bytes());
        adu.push(self.unit_id);
        adu.push(self.function_code);
        adu.extend_from_slice(&self.data);
        adu
    }
}

/// Builder for telemetry datagrams. Optional fields are laid out in
/// presence-bit order regardless of the order the setters are called in.
#[derive(Debug, Clone)]
pub struct TelemetryBuilder {
    magic: u8,
    version: u8,
    msg_type: u8,
    timestamp: Option<u64>,
    sequence: Option<u32>,
    source_id: Option<u16>,
    sensor: Option<[u8; 4]>,
    gateway: Option<[u8; 6]>,
    extra_presence: u8,
    options: Vec<u8>,
    crc: Option<u16>,
}

impl TelemetryBuilder {
    pub fn new(msg_type: u8) -> Self {
        Self {
            magic: super::telemetry::MAGIC_V1,
            version: 1,
            msg_type,
            timestamp: None,
            sequence: None,
            source_id: None,
            sensor: None,
            gateway: None,
            extra_presence: 0,
            options: Vec::new(),
            crc: None,
        }
    }

    pub fn magic(mut self, magic: u8) -> Self {
        self.magic = magic;
        self
    }

    pub fn timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn sequence(mut self, seq: u32) -> Self {
        self.sequence = Some(seq);
        self
    }

    pub fn source_id(mut self, id: u16) -> Self {
        self.source_id = Some(id);
        self
    }

    pub fn sensor(mut self, ip: [u8; 4]) -> Self {
        self.sensor = Some(ip);
        self
    }

    pub fn gateway(mut self, mac: [u8; 6]) -> Self {
        self.gateway = Some(mac);
        self
    }

    /// Set presence bits that announce no known field.
    pub fn extra_presence(mut self, bits: u8) -> Self {
        self.extra_presence = bits;
        self
    }

    /// Append a `{type u8, length u8, value}` option.
    pub fn option(mut self, tag: u8, value: &[u8]) -> Self {
        self.options.push(tag);
        self.options.push(value.len() as u8);
        self.options.extend_from_slice(value);
        self
    }

    /// Append raw option bytes.
    pub fn raw_options(mut self, bytes: &[u8]) -> Self {
        self.options.extend_from_slice(bytes);
        self
    }

    pub fn crc(mut self, crc: u16) -> Self {
        self.crc = Some(crc);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut presence = self.extra_presence;
        let mut fields = Vec::new();
        if let Some(ts) = self.timestamp {
            presence |= 1 << 0;
            fields.extend_from_slice(&ts.to_be_bytes());
        }
        if let Some(seq) = self.sequence {
            presence |= 1 << 1;
            fields.extend_from_slice(&seq.to_be_bytes());
        }
        if let Some(id) = self.source_id {
            presence |= 1 << 2;
            fields.extend_from_slice(&id.to_be_bytes());
        }
        if let Some(ip) = self.sensor {
            presence |= 1 << 3;
            fields.extend_from_slice(&ip);
        }
        if let Some(mac) = self.gateway {
            presence |= 1 << 4;
            fields.extend_from_slice(&mac);
        }

        let mut body = vec![presence];
        body.extend(fields);
        body.extend(self.options);

        let mut msg = vec![self.magic, (self.version << 4) | (self.msg_type & 0x0F)];
        msg.extend(encode_vle(body.len() as u32).unwrap_or_default());
        msg.extend(body);
        let crc = self.crc.unwrap_or_else(|| crc16_ccitt(&msg));
        msg.extend_from_slice(&crc.to_be_bytes());
        msg
    }
}

/// Names of the fields of a message, in order.
pub fn field_names<'m>(message: &'m DecodedMessage<'_>) -> Vec<&'m str> {
    message.fields.iter().map(|f| f.descriptor.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regbus_builder() {
        let msg = RegBusBuilder::new(0x01).sequence(7).payload(vec![0, 1, 5]).build();
        assert_eq!(&msg[..6], &[0x52, 0x42, 0x01, 0x07, 0x00, 0x03]);
        assert_eq!(msg.len(), 11);
    }

    #[test]
    fn test_modbus_builder() {
        let adu = ModbusBuilder::new(3).transaction_id(1).data(vec![0, 0, 0, 2]).build();
        assert_eq!(adu, vec![0, 1, 0, 0, 0, 6, 1, 3, 0, 0, 0, 2]);
    }

    #[test]
    fn test_telemetry_builder_orders_fields() {
        let msg = TelemetryBuilder::new(1).source_id(0x0102).sequence(9).build();
        // presence bits 1 and 2, sequence before source id
        assert_eq!(msg[3], 0b0000_0110);
        assert_eq!(&msg[4..8], &[0, 0, 0, 9]);
        assert_eq!(&msg[8..10], &[1, 2]);
    }
}
