//! Presentation sink.
//!
//! Decoders never render anything themselves. A [`DecodedMessage`] is pushed
//! into a [`FieldSink`] one field at a time; the sink decides what to keep.

use std::ops::Range;

use compact_str::CompactString;
use serde::Serialize;

use crate::correlate::{Direction, MessageRef, TransactionId};
use crate::protocol::{Annotation, CorrelationInfo, DecodedField, DecodedMessage, OwnedFieldValue};
use crate::schema::DataKind;
use crate::wire::ChecksumVerdict;

/// Write-only receiver for decoded output.
pub trait FieldSink {
    /// A message starts. Header data and the summary are available here.
    fn begin_message(&mut self, message: &DecodedMessage<'_>);

    /// Append one field.
    fn field(&mut self, field: &DecodedField<'_>);

    /// Correlation result for the current message.
    fn correlation(&mut self, _info: &CorrelationInfo) {}

    /// The message is complete.
    fn end_message(&mut self, _message: &DecodedMessage<'_>) {}
}

/// A decoded field detached from the buffer it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnedDecodedField {
    pub name: &'static str,
    pub display: &'static str,
    pub kind: DataKind,
    pub range: Range<usize>,
    pub value: OwnedFieldValue,
    pub rendered: CompactString,
    pub depth: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl From<&DecodedField<'_>> for OwnedDecodedField {
    fn from(field: &DecodedField<'_>) -> Self {
        Self {
            name: field.descriptor.name,
            display: field.descriptor.display,
            kind: field.descriptor.kind,
            range: field.range.clone(),
            value: field.value.to_owned(),
            rendered: field.rendered.clone(),
            depth: field.depth,
            annotations: field.annotations.to_vec(),
        }
    }
}

/// Owned copy of one message, ready for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub protocol: &'static str,
    pub message: MessageRef,
    pub range: Range<usize>,
    pub direction: Direction,
    pub type_name: Option<&'static str>,
    pub opcode: Option<u32>,
    pub transaction_id: Option<TransactionId>,
    pub summary: String,
    pub fields: Vec<OwnedDecodedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    pub checksum: Option<ChecksumVerdict>,
    pub correlation: Option<CorrelationInfo>,
    pub error: Option<String>,
}

impl MessageRecord {
    pub fn field(&self, name: &str) -> Option<&OwnedDecodedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Sink that keeps an owned copy of everything it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Vec<MessageRecord>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MessageRecord> {
        self.records
    }
}

impl FieldSink for CollectingSink {
    fn begin_message(&mut self, message: &DecodedMessage<'_>) {
        self.records.push(MessageRecord {
            protocol: message.protocol,
            message: message.message_ref,
            range: message.range.clone(),
            direction: message.direction,
            type_name: message.type_name,
            opcode: message.opcode,
            transaction_id: message.transaction_id,
            summary: message.summary(),
            fields: Vec::with_capacity(message.fields.len()),
            annotations: message.annotations.to_vec(),
            checksum: message.checksum.clone(),
            correlation: None,
            error: message.error.as_ref().map(|e| e.to_string()),
        });
    }

    fn field(&mut self, field: &DecodedField<'_>) {
        if let Some(record) = self.records.last_mut() {
            record.fields.push(field.into());
        }
    }

    fn correlation(&mut self, info: &CorrelationInfo) {
        if let Some(record) = self.records.last_mut() {
            record.correlation = Some(info.clone());
        }
    }
}
