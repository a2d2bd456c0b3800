//! Decoded fields and the per-message field collector.

use std::ops::Range;

use compact_str::CompactString;
use serde::Serialize;
use smallvec::SmallVec;

use crate::correlate::MessageRef;
use crate::error::DecodeError;
use crate::schema::{DataKind, FieldDescriptor, FieldSize};
use crate::wire::{ByteCursor, Endian};

use super::FieldValue;

/// A diagnostic attached to a field or message. Never stops decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    BadChecksum { computed: u32, received: u32 },
    UnknownOpcode { opcode: u32 },
    /// A self-describing field id with no catalog entry; the rest of the
    /// region is shown raw.
    UnknownField { id: u32 },
    /// A catalog entry whose size cannot be recovered from the bytes.
    UnwalkableField { id: u32 },
    ContextDependent { reason: &'static str },
    DuplicateResponse { first_response: MessageRef },
    RequestRetransmitted { previous: MessageRef },
    UnknownPresenceBits { bits: u64 },
    /// A reply field the matching request did not ask for.
    Unrequested { id: u32 },
    TrailingBytes { count: usize },
}

impl Annotation {
    /// Whether the annotation reports an anomaly rather than a limitation
    /// of the available context.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Annotation::ContextDependent { .. })
    }
}

impl std::fmt::Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Annotation::BadChecksum { computed, received } => write!(
                f,
                "[BAD CHECKSUM] computed {computed:#06x}, received {received:#06x}"
            ),
            Annotation::UnknownOpcode { opcode } => {
                write!(f, "unknown message type {opcode:#04x}, payload shown raw")
            }
            Annotation::UnknownField { id } => {
                write!(f, "unknown field id {id:#04x}, remaining bytes cannot be interpreted")
            }
            Annotation::UnwalkableField { id } => {
                write!(f, "field {id:#04x} has no recoverable size, remaining bytes cannot be interpreted")
            }
            Annotation::ContextDependent { reason } => write!(f, "interpretation depends on {reason}"),
            Annotation::DuplicateResponse { first_response } => {
                write!(f, "WARNING: answer already found in {first_response}")
            }
            Annotation::RequestRetransmitted { previous } => {
                write!(f, "request retransmitted, unanswered copy in {previous}")
            }
            Annotation::UnknownPresenceBits { bits } => write!(f, "unknown presence bits {bits:#x}"),
            Annotation::Unrequested { id } => write!(f, "field {id:#04x} was not requested"),
            Annotation::TrailingBytes { count } => {
                write!(f, "{count} bytes past the end of the decoded structure")
            }
        }
    }
}

/// One decoded field.
#[derive(Debug, Clone)]
pub struct DecodedField<'a> {
    pub descriptor: &'static FieldDescriptor,
    /// Frame-absolute byte range.
    pub range: Range<usize>,
    pub value: FieldValue<'a>,
    pub rendered: CompactString,
    /// Nesting level below the message root.
    pub depth: u8,
    pub annotations: SmallVec<[Annotation; 1]>,
}

impl<'a> DecodedField<'a> {
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Collects the fields of one message as they are read.
///
/// Every `read_*` method consumes bytes from the cursor, records a field
/// covering exactly those bytes and maps a short read to
/// [`DecodeError::TruncatedField`] naming the descriptor. Nothing is
/// recorded for a failed read.
#[derive(Debug)]
pub struct FieldTree<'a> {
    protocol: &'static str,
    origin: usize,
    depth: u8,
    fields: Vec<DecodedField<'a>>,
}

impl<'a> FieldTree<'a> {
    /// `origin` is added to cursor positions to make ranges frame-absolute.
    pub fn new(protocol: &'static str, origin: usize) -> Self {
        Self {
            protocol,
            origin,
            depth: 0,
            fields: Vec::with_capacity(16),
        }
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn fields(&self) -> &[DecodedField<'a>] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [DecodedField<'a>] {
        &mut self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<DecodedField<'a>> {
        self.fields
    }

    /// Record a field covering `range` (cursor positions).
    pub fn push(
        &mut self,
        descriptor: &'static FieldDescriptor,
        range: Range<usize>,
        value: FieldValue<'a>,
    ) -> &mut DecodedField<'a> {
        let rendered = descriptor.render_value(&value);
        self.fields.push(DecodedField {
            descriptor,
            range: self.origin + range.start..self.origin + range.end,
            value,
            rendered,
            depth: self.depth,
            annotations: SmallVec::new(),
        });
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    /// The most recent field.
    pub fn last_mut(&mut self) -> Option<&mut DecodedField<'a>> {
        self.fields.last_mut()
    }

    /// Attach an annotation to the most recent field.
    pub fn annotate_last(&mut self, annotation: Annotation) {
        if let Some(field) = self.fields.last_mut() {
            field.annotations.push(annotation);
        }
    }

    /// Run `f` with fields recorded one level deeper.
    pub fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.depth = self.depth.saturating_add(1);
        let out = f(self);
        self.depth = self.depth.saturating_sub(1);
        out
    }

    fn truncated(&self, desc: &'static FieldDescriptor) -> impl Fn(crate::error::OutOfBounds) -> DecodeError {
        let protocol = self.protocol;
        move |oob| oob.in_field(protocol, desc.name)
    }

    pub fn read_u8(&mut self, cur: &mut ByteCursor<'a>, desc: &'static FieldDescriptor) -> Result<u8, DecodeError> {
        let start = cur.position();
        let v = cur.read_u8().map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::UInt8(v));
        Ok(v)
    }

    pub fn read_u16(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        endian: Endian,
    ) -> Result<u16, DecodeError> {
        let start = cur.position();
        let v = cur.read_u16(endian).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::UInt16(v));
        Ok(v)
    }

    pub fn read_u32(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        endian: Endian,
    ) -> Result<u32, DecodeError> {
        let start = cur.position();
        let v = cur.read_u32(endian).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::UInt32(v));
        Ok(v)
    }

    pub fn read_u64(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        endian: Endian,
    ) -> Result<u64, DecodeError> {
        let start = cur.position();
        let v = cur.read_u64(endian).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::UInt64(v));
        Ok(v)
    }

    pub fn read_ipv4(&mut self, cur: &mut ByteCursor<'a>, desc: &'static FieldDescriptor) -> Result<(), DecodeError> {
        let start = cur.position();
        let bytes = cur.take(4).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::ipv4(bytes));
        Ok(())
    }

    pub fn read_mac(&mut self, cur: &mut ByteCursor<'a>, desc: &'static FieldDescriptor) -> Result<(), DecodeError> {
        let start = cur.position();
        let bytes = cur.take(6).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::mac(bytes));
        Ok(())
    }

    pub fn read_bytes(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        len: usize,
    ) -> Result<&'a [u8], DecodeError> {
        let start = cur.position();
        let bytes = cur.take(len).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::Bytes(bytes));
        Ok(bytes)
    }

    pub fn read_string(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        len: usize,
    ) -> Result<&'a [u8], DecodeError> {
        let start = cur.position();
        let bytes = cur.take(len).map_err(self.truncated(desc))?;
        self.push(desc, start..cur.position(), FieldValue::text(bytes));
        Ok(bytes)
    }

    /// Read a length-prefixed run. The field covers the prefix too.
    pub fn read_prefixed(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        width: usize,
        endian: Endian,
    ) -> Result<&'a [u8], DecodeError> {
        let start = cur.position();
        let bytes = cur.read_prefixed(width, endian).map_err(self.truncated(desc))?;
        let value = match desc.kind {
            DataKind::String => FieldValue::text(bytes),
            _ => FieldValue::Bytes(bytes),
        };
        self.push(desc, start..cur.position(), value);
        Ok(bytes)
    }

    /// Read a field the way its descriptor describes it.
    ///
    /// A [`FieldSize::Variable`] descriptor takes everything up to the
    /// cursor limit; callers that need to keep walking check
    /// [`FieldSize::is_walkable`] first.
    pub fn read_value(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        endian: Endian,
    ) -> Result<FieldValue<'a>, DecodeError> {
        let start = cur.position();
        let value = match desc.size {
            FieldSize::Fixed(n) => {
                let bytes = cur.take(n).map_err(self.truncated(desc))?;
                decode_fixed(desc.kind, bytes, endian)
            }
            FieldSize::LengthPrefixed(width) => {
                let bytes = cur.read_prefixed(width, endian).map_err(self.truncated(desc))?;
                decode_fixed(desc.kind, bytes, endian)
            }
            FieldSize::Variable => decode_fixed(desc.kind, cur.take_rest(), endian),
        };
        self.push(desc, start..cur.position(), value.clone());
        Ok(value)
    }

    /// Consume the rest of the cursor as one raw field carrying `annotation`.
    pub fn opaque(
        &mut self,
        cur: &mut ByteCursor<'a>,
        desc: &'static FieldDescriptor,
        annotation: Annotation,
    ) -> &'a [u8] {
        let start = cur.position();
        let bytes = cur.take_rest();
        self.push(desc, start..cur.position(), FieldValue::Bytes(bytes))
            .annotations
            .push(annotation);
        bytes
    }
}

/// Interpret a run of bytes as a value of `kind`.
///
/// Integer kinds wider than the run use what is there.
pub fn decode_fixed<'a>(kind: DataKind, bytes: &'a [u8], endian: Endian) -> FieldValue<'a> {
    let uint = || {
        let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
        match endian {
            Endian::Big => bytes.iter().take(8).fold(0, fold),
            Endian::Little => bytes.iter().take(8).rev().fold(0, fold),
        }
    };
    match kind {
        DataKind::Bool => FieldValue::Bool(bytes.iter().any(|&b| b != 0)),
        DataKind::UInt8 => FieldValue::UInt8(uint() as u8),
        DataKind::UInt16 => FieldValue::UInt16(uint() as u16),
        DataKind::UInt32 => FieldValue::UInt32(uint() as u32),
        DataKind::UInt64 => FieldValue::UInt64(uint()),
        DataKind::Int64 => FieldValue::Int64(uint() as i64),
        DataKind::Enum(1) => FieldValue::UInt8(uint() as u8),
        DataKind::Enum(2) => FieldValue::UInt16(uint() as u16),
        DataKind::Enum(3 | 4) => FieldValue::UInt32(uint() as u32),
        DataKind::Enum(_) => FieldValue::UInt64(uint()),
        DataKind::Ipv4 => FieldValue::ipv4(bytes),
        DataKind::Mac => FieldValue::mac(bytes),
        DataKind::String => FieldValue::text(bytes),
        DataKind::Binary | DataKind::FixedBinary(_) => FieldValue::Bytes(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SEQ: FieldDescriptor = FieldDescriptor::new("t.seq", "Sequence", DataKind::UInt16);
    static ADDR: FieldDescriptor = FieldDescriptor::new("t.addr", "Address", DataKind::Ipv4);
    static NAME: FieldDescriptor = FieldDescriptor::new("t.name", "Name", DataKind::String)
        .with_size(FieldSize::LengthPrefixed(1));
    static RAW: FieldDescriptor = FieldDescriptor::new("t.raw", "Raw", DataKind::Binary);

    // Test 1: ranges track the cursor and include the origin
    #[test]
    fn test_ranges_are_frame_absolute() {
        let data = [0x00, 0x2A, 10, 0, 0, 1];
        let mut cur = ByteCursor::new(&data);
        let mut tree = FieldTree::new("t", 100);
        assert_eq!(tree.read_u16(&mut cur, &SEQ, Endian::Big).unwrap(), 42);
        tree.read_ipv4(&mut cur, &ADDR).unwrap();

        let fields = tree.into_fields();
        assert_eq!(fields[0].range, 100..102);
        assert_eq!(fields[1].range, 102..106);
        assert_eq!(fields[1].rendered, "10.0.0.1");
    }

    // Test 2: a short read names the field and records nothing
    #[test]
    fn test_truncated_field() {
        let data = [0x01, 0x02, 0x03];
        let mut cur = ByteCursor::new(&data);
        let mut tree = FieldTree::new("t", 0);
        tree.read_u16(&mut cur, &SEQ, Endian::Big).unwrap();
        let err = tree.read_ipv4(&mut cur, &ADDR).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedField {
                protocol: "t",
                field: "t.addr",
                offset: 2,
                needed: 4,
                available: 1
            }
        );
        assert_eq!(tree.len(), 1);
    }

    // Test 3: catalog-driven reads
    #[test]
    fn test_read_value_by_descriptor() {
        let data = [0x03, b'f', b'o', b'o', 0xEE];
        let mut cur = ByteCursor::new(&data);
        let mut tree = FieldTree::new("t", 0);
        let v = tree.read_value(&mut cur, &NAME, Endian::Big).unwrap();
        assert_eq!(v, FieldValue::Str("foo"));
        assert_eq!(tree.fields()[0].range, 0..4);

        let rest = tree.opaque(&mut cur, &RAW, Annotation::UnknownField { id: 0xEE });
        assert_eq!(rest, &[0xEE]);
        assert!(cur.is_empty());
        assert_eq!(tree.fields()[1].annotations[0], Annotation::UnknownField { id: 0xEE });
    }

    // Test 4: nesting depth
    #[test]
    fn test_nested_depth() {
        let data = [1, 2];
        let mut cur = ByteCursor::new(&data);
        let mut tree = FieldTree::new("t", 0);
        tree.nested(|t| t.read_bytes(&mut cur, &RAW, 1)).unwrap();
        tree.read_bytes(&mut cur, &RAW, 1).unwrap();
        assert_eq!(tree.fields()[0].depth, 1);
        assert_eq!(tree.fields()[1].depth, 0);
    }

    #[test]
    fn test_decode_fixed_kinds() {
        assert_eq!(decode_fixed(DataKind::UInt16, &[0x34, 0x12], Endian::Little), FieldValue::UInt16(0x1234));
        assert_eq!(decode_fixed(DataKind::Enum(1), &[3], Endian::Big), FieldValue::UInt8(3));
        assert_eq!(decode_fixed(DataKind::Bool, &[0, 1], Endian::Big), FieldValue::Bool(true));
        assert!(decode_fixed(DataKind::Mac, &[1, 2], Endian::Big).is_null());
    }

    #[test]
    fn test_annotation_display() {
        let a = Annotation::BadChecksum {
            computed: 0x4aa1,
            received: 0x1234,
        };
        assert_eq!(a.to_string(), "[BAD CHECKSUM] computed 0x4aa1, received 0x1234");
        assert!(!Annotation::ContextDependent { reason: "request" }.is_warning());
    }
}
