//! Decode context and result types.

use std::fmt::Write as _;
use std::ops::Range;

use serde::Serialize;
use smallvec::SmallVec;

use crate::correlate::{ConversationId, Direction, MessageRef, TransactionId};
use crate::error::DecodeError;
use crate::sink::FieldSink;
use crate::wire::ChecksumVerdict;

use super::{Annotation, DecodedField};

/// Hint entry for protocol detection: (hint_name, value).
pub type HintEntry = (&'static str, u64);

/// Hint carrying the transport source port.
pub const HINT_SRC_PORT: &str = "src_port";
/// Hint carrying the transport destination port.
pub const HINT_DST_PORT: &str = "dst_port";
/// Hint carrying the IP protocol number of the transport (6 or 17).
pub const HINT_TRANSPORT: &str = "transport";

/// Everything a decoder learns from its environment rather than from the
/// bytes: which conversation and frame the buffer came from, and whether
/// this is the first time the host shows it to the decoder.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// Conversation identity, supplied by the host.
    pub conversation: ConversationId,

    /// Frame number of the buffer.
    pub frame: u64,

    /// Capture timestamp in microseconds.
    pub timestamp_us: u64,

    /// Direction relative to the conversation's server.
    pub direction: Direction,

    /// True on the first visit to this frame. Requests register only then.
    pub first_pass: bool,

    /// Offset of the buffer within its frame; added to emitted ranges.
    pub offset: usize,

    /// Transport hints (ports, IP protocol). Typically 2-3 entries.
    pub hints: SmallVec<[HintEntry; 4]>,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(ConversationId::default(), 0)
    }
}

impl DecodeContext {
    pub fn new(conversation: ConversationId, frame: u64) -> Self {
        Self {
            conversation,
            frame,
            timestamp_us: 0,
            direction: Direction::Unknown,
            first_pass: true,
            offset: 0,
            hints: SmallVec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_first_pass(mut self, first_pass: bool) -> Self {
        self.first_pass = first_pass;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Get a hint value by key (linear search, but N is small).
    #[inline]
    pub fn hint(&self, key: &str) -> Option<u64> {
        self.hints.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Insert a hint value (appends, may create duplicates).
    #[inline]
    pub fn insert_hint(&mut self, key: &'static str, value: u64) {
        self.hints.push((key, value));
    }

    /// Set a hint value (updates existing or appends).
    #[inline]
    pub fn set_hint(&mut self, key: &'static str, value: u64) {
        if let Some(entry) = self.hints.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.hints.push((key, value));
        }
    }

    /// Whether either transport port equals `port`.
    pub fn has_port(&self, port: u16) -> bool {
        let port = port as u64;
        self.hint(HINT_DST_PORT) == Some(port) || self.hint(HINT_SRC_PORT) == Some(port)
    }
}

/// Side of an exchange a message is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Request,
    Response,
}

/// Cross-reference data for a correlated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationInfo {
    pub role: Role,
    pub transaction_id: TransactionId,
    /// The response of a request, or the request of a response.
    pub peer: Option<MessageRef>,
    /// Request to response time, once both are known.
    pub elapsed_us: Option<u64>,
}

impl std::fmt::Display for CorrelationInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.role, self.peer) {
            (Role::Request, Some(peer)) => write!(f, "response in {peer}")?,
            (Role::Request, None) => write!(f, "no response seen")?,
            (Role::Response, Some(peer)) => write!(f, "request in {peer}")?,
            (Role::Response, None) => write!(f, "no request seen")?,
        }
        if let Some(us) = self.elapsed_us {
            write!(f, " ({}.{:06}s)", us / 1_000_000, us % 1_000_000)?;
        }
        Ok(())
    }
}

/// One decoded protocol message.
#[derive(Debug, Clone)]
pub struct DecodedMessage<'a> {
    pub protocol: &'static str,
    pub message_ref: MessageRef,
    /// Frame-absolute byte range.
    pub range: Range<usize>,
    pub direction: Direction,
    /// Dispatch key, once the header was read.
    pub opcode: Option<u32>,
    pub type_name: Option<&'static str>,
    pub transaction_id: Option<TransactionId>,
    pub fields: Vec<DecodedField<'a>>,
    /// Message-level annotations; field-level ones live on the fields.
    pub annotations: SmallVec<[Annotation; 2]>,
    pub checksum: Option<ChecksumVerdict>,
    pub correlation: Option<CorrelationInfo>,
    /// Structural error that stopped decoding; fields before it are kept.
    pub error: Option<DecodeError>,
    /// Names of fields shown in the one-line summary.
    pub summary_fields: &'static [&'static str],
}

impl<'a> DecodedMessage<'a> {
    pub fn is_malformed(&self) -> bool {
        self.error.is_some()
    }

    /// First field with the given name.
    pub fn field(&self, name: &str) -> Option<&DecodedField<'a>> {
        self.fields.iter().find(|f| f.descriptor.name == name)
    }

    /// Every annotation, message-level first.
    pub fn all_annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .chain(self.fields.iter().flat_map(|f| f.annotations.iter()))
    }

    /// One-line status string: protocol, message type, key field values.
    pub fn summary(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(self.protocol);
        match (self.type_name, self.opcode) {
            (Some(name), _) => {
                let _ = write!(out, " {name}");
            }
            (None, Some(op)) => {
                let _ = write!(out, " type={op:#04x}");
            }
            (None, None) => {}
        }
        if let Some(id) = self.transaction_id {
            let _ = write!(out, " id={id}");
        }
        for name in self.summary_fields {
            if let Some(field) = self.field(name) {
                let _ = write!(out, " {}={}", field.descriptor.display, field.rendered);
            }
        }
        if let Some(info) = &self.correlation {
            let _ = write!(out, " ({info})");
        }
        if self.checksum.as_ref().is_some_and(|c| !c.is_valid()) {
            out.push_str(" [BAD CHECKSUM]");
        }
        if self
            .all_annotations()
            .any(|a| matches!(a, Annotation::DuplicateResponse { .. }))
        {
            out.push_str(" [DUPLICATE RESPONSE]");
        }
        if let Some(err) = &self.error {
            let _ = write!(out, " [MALFORMED: {err}]");
        }
        out
    }

    /// Hand the message to a presentation sink.
    pub fn emit(&self, sink: &mut dyn FieldSink) {
        sink.begin_message(self);
        for field in &self.fields {
            sink.field(field);
        }
        if let Some(info) = &self.correlation {
            sink.correlation(info);
        }
        sink.end_message(self);
    }
}

/// Outcome of decoding one transport buffer.
#[derive(Debug, Clone)]
pub enum Dissection<'a> {
    /// The first header did not belong to the protocol.
    NotThisProtocol,
    /// Every message decoded; `consumed` bytes were walked.
    Decoded {
        messages: Vec<DecodedMessage<'a>>,
        consumed: usize,
    },
    /// A structural error stopped the buffer. The failing message is the
    /// last one and carries the partial field list.
    Malformed {
        messages: Vec<DecodedMessage<'a>>,
        error: DecodeError,
    },
}

impl<'a> Dissection<'a> {
    pub fn is_not_this_protocol(&self) -> bool {
        matches!(self, Dissection::NotThisProtocol)
    }

    pub fn messages(&self) -> &[DecodedMessage<'a>] {
        match self {
            Dissection::NotThisProtocol => &[],
            Dissection::Decoded { messages, .. } | Dissection::Malformed { messages, .. } => messages,
        }
    }

    pub fn into_messages(self) -> Vec<DecodedMessage<'a>> {
        match self {
            Dissection::NotThisProtocol => Vec::new(),
            Dissection::Decoded { messages, .. } | Dissection::Malformed { messages, .. } => messages,
        }
    }

    pub fn error(&self) -> Option<&DecodeError> {
        match self {
            Dissection::Malformed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints() {
        let mut ctx = DecodeContext::new(ConversationId(1), 5);
        ctx.insert_hint(HINT_DST_PORT, 502);
        ctx.set_hint(HINT_SRC_PORT, 40000);
        ctx.set_hint(HINT_SRC_PORT, 40001);
        assert_eq!(ctx.hint(HINT_SRC_PORT), Some(40001));
        assert!(ctx.has_port(502));
        assert!(!ctx.has_port(503));
        assert!(ctx.first_pass);
    }

    #[test]
    fn test_correlation_display() {
        let info = CorrelationInfo {
            role: Role::Response,
            transaction_id: TransactionId::Wire(4),
            peer: Some(MessageRef::new(3, 0)),
            elapsed_us: Some(1_500_250),
        };
        assert_eq!(info.to_string(), "request in frame 3 (1.500250s)");
    }
}
