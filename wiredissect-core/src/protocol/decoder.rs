//! The generic message decoder.
//!
//! A protocol describes its wire format through [`MessageFormat`]: how to
//! read a header, which routine decodes each opcode, where its checksum sits
//! and how its messages pair up. [`decode_buffer`] drives any such format
//! over a transport buffer:
//!
//! ```text
//! ReadHeader -> ReadLength -> SlicePayload -> DispatchByType
//!            -> DecodeFields -> ValidateChecksum -> Done
//! ```
//!
//! with every structural failure ending the message (and the buffer, since
//! later offsets can no longer be trusted).

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::correlate::{
    AnalysisSession, CorrelationKey, Direction, MatchOutcome, MessageRef, RequestParams,
    TransactionId,
};
use crate::error::DecodeError;
use crate::schema::FieldDescriptor;
use crate::wire::{checksum, ByteCursor, ChecksumAlgorithm, Endian};

use super::{
    Annotation, CorrelationInfo, DecodeContext, DecodedMessage, Dissection, FieldTree, FieldValue,
    Role,
};

/// What a header says about the message that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Dispatch key.
    pub opcode: u32,
    /// Transaction id, if the message carries one.
    pub transaction_id: Option<u32>,
    /// Declared payload length, counted from the end of the header.
    pub payload_len: usize,
    /// Bytes after the payload that belong to the message (checksums).
    pub trailer_len: usize,
}

/// Field-decoding routine for one opcode.
pub type DecodeFn =
    for<'a> fn(&mut ByteCursor<'a>, &mut FieldTree<'a>, &mut BodyContext) -> Result<(), DecodeError>;

/// State shared between the engine and a field-decoding routine.
#[derive(Debug, Clone)]
pub struct BodyContext {
    pub direction: Direction,
    /// Role of the message, when the format can tell.
    pub role: Option<Role>,
    /// Parameters stored by the matching request, for responses whose
    /// layout depends on what was asked.
    pub request_params: Option<RequestParams>,
    /// Parameters a request routine wants stored for its response.
    pub params: RequestParams,
    /// Upper bound on TLV entries per region.
    pub max_tlv_entries: usize,
    /// Message-level annotations raised by the routine.
    pub annotations: SmallVec<[Annotation; 2]>,
}

impl BodyContext {
    pub fn new(direction: Direction, role: Option<Role>, max_tlv_entries: usize) -> Self {
        Self {
            direction,
            role,
            request_params: None,
            params: RequestParams::new(),
            max_tlv_entries,
            annotations: SmallVec::new(),
        }
    }
}

/// One row of a dispatch table.
#[derive(Clone, Copy)]
pub struct DispatchEntry {
    pub opcode: u32,
    pub name: &'static str,
    pub decode: DecodeFn,
}

impl DispatchEntry {
    pub const fn new(opcode: u32, name: &'static str, decode: DecodeFn) -> Self {
        Self { opcode, name, decode }
    }
}

impl std::fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .finish()
    }
}

/// Static opcode to routine table.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTable {
    entries: &'static [DispatchEntry],
}

impl DispatchTable {
    pub const fn new(entries: &'static [DispatchEntry]) -> Self {
        Self { entries }
    }

    pub fn find(&self, opcode: u32) -> Option<&'static DispatchEntry> {
        self.entries.iter().find(|e| e.opcode == opcode)
    }

    pub fn name(&self, opcode: u32) -> Option<&'static str> {
        self.find(opcode).map(|e| e.name)
    }

    pub fn entries(&self) -> &'static [DispatchEntry] {
        self.entries
    }
}

/// Request/response pairing of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub role: Role,
    /// Message type the response carries; part of the correlation key.
    pub response_type: u32,
}

impl Exchange {
    pub const fn request(response_type: u32) -> Self {
        Self {
            role: Role::Request,
            response_type,
        }
    }

    pub const fn response(response_type: u32) -> Self {
        Self {
            role: Role::Response,
            response_type,
        }
    }
}

/// How a protocol's transaction ids become correlation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Use the id from the wire.
    #[default]
    WireId,
    /// Use the id from the wire unless it is zero; zero ids are replaced by
    /// a per-conversation counter.
    SyntheticWhenZero,
}

/// Where a trailing checksum lives and how to check it.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumSpec {
    pub algorithm: ChecksumAlgorithm,
    pub endian: Endian,
    pub descriptor: &'static FieldDescriptor,
}

/// Wire format of a message-oriented protocol.
pub trait MessageFormat {
    /// Protocol name used in errors and output.
    fn name(&self) -> &'static str;

    /// Read the fixed header, leaving the cursor at the first payload byte.
    ///
    /// Returns [`DecodeError::UnknownMagic`] when the bytes belong to some
    /// other protocol.
    fn read_header<'a>(
        &self,
        cursor: &mut ByteCursor<'a>,
        tree: &mut FieldTree<'a>,
    ) -> Result<MessageHeader, DecodeError>;

    fn dispatch(&self) -> &DispatchTable;

    /// Pick the routine for a message. Defaults to a table lookup.
    fn select(&self, header: &MessageHeader, _body: &BodyContext) -> Option<&'static DispatchEntry> {
        self.dispatch().find(header.opcode)
    }

    fn checksum(&self) -> Option<ChecksumSpec> {
        None
    }

    /// Role and response type of a message, if it takes part in an
    /// exchange.
    fn exchange(&self, _header: &MessageHeader, _direction: Direction) -> Option<Exchange> {
        None
    }

    fn key_policy(&self) -> KeyPolicy {
        KeyPolicy::WireId
    }

    /// Descriptor for payloads shown raw.
    fn opaque_descriptor(&self) -> &'static FieldDescriptor;

    /// Fields shown in the one-line summary.
    fn summary_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Total length of the message at the start of `data`, once enough
    /// header bytes are present.
    fn frame_length(&self, data: &[u8]) -> Option<usize> {
        let mut cursor = ByteCursor::new(data);
        let mut scratch = FieldTree::new(self.name(), 0);
        let header = self.read_header(&mut cursor, &mut scratch).ok()?;
        cursor
            .position()
            .checked_add(header.payload_len)?
            .checked_add(header.trailer_len)
    }
}

/// Length of the next message in a stream, for transport reassembly.
pub fn message_length<F: MessageFormat + ?Sized>(format: &F, data: &[u8]) -> Option<usize> {
    format.frame_length(data)
}

/// Decode every message packed into `data`.
pub fn decode_buffer<'a, F: MessageFormat + ?Sized>(
    format: &F,
    data: &'a [u8],
    ctx: &DecodeContext,
    session: &mut AnalysisSession,
) -> Dissection<'a> {
    let buffer = ByteCursor::new(data);
    let max_messages = session.config().max_messages_per_buffer;
    let mut messages = Vec::new();
    let mut pos = 0;

    while pos < data.len() && messages.len() < max_messages {
        let mut cursor = buffer;
        if cursor.seek(pos).is_err() {
            break;
        }
        let message_ref = MessageRef::new(ctx.frame, messages.len() as u32);
        let (message, end) = decode_message(format, cursor, message_ref, ctx, session);

        if let Some(err) = message.error.clone() {
            if err.is_not_this_protocol() && messages.is_empty() {
                return Dissection::NotThisProtocol;
            }
            debug!(protocol = format.name(), %message_ref, error = %err, "buffer abandoned");
            messages.push(message);
            return Dissection::Malformed { messages, error: err };
        }
        messages.push(message);
        if end <= pos {
            break;
        }
        pos = end;
    }

    if pos < data.len() {
        debug!(
            protocol = format.name(),
            frame = ctx.frame,
            skipped = data.len() - pos,
            "message limit reached"
        );
    }

    Dissection::Decoded {
        messages,
        consumed: pos,
    }
}

/// Decode the message at the cursor. Returns it with the offset just past
/// its end.
fn decode_message<'a, F: MessageFormat + ?Sized>(
    format: &F,
    mut cursor: ByteCursor<'a>,
    message_ref: MessageRef,
    ctx: &DecodeContext,
    session: &mut AnalysisSession,
) -> (DecodedMessage<'a>, usize) {
    let protocol = format.name();
    let start = cursor.position();
    let mut tree = FieldTree::new(protocol, ctx.offset);
    let mut message = DecodedMessage {
        protocol,
        message_ref,
        range: ctx.offset + start..ctx.offset + cursor.limit(),
        direction: ctx.direction,
        opcode: None,
        type_name: None,
        transaction_id: None,
        fields: Vec::new(),
        annotations: SmallVec::new(),
        checksum: None,
        correlation: None,
        error: None,
        summary_fields: format.summary_fields(),
    };

    // ReadHeader + ReadLength
    let header = match format.read_header(&mut cursor, &mut tree) {
        Ok(header) => header,
        Err(err) => {
            message.fields = tree.into_fields();
            message.error = Some(err);
            return (message, cursor.limit());
        }
    };
    message.opcode = Some(header.opcode);

    let payload_start = cursor.position();
    let payload_end = payload_start.saturating_add(header.payload_len);
    let message_end = payload_end.saturating_add(header.trailer_len);
    let overrun = message_end > cursor.limit();
    if overrun {
        warn!(
            protocol,
            %message_ref,
            declared = header.payload_len,
            available = cursor.remaining(),
            "declared length exceeds buffer"
        );
    }

    // SlicePayload: exactly the declared bytes, or what is left of them.
    let mut payload = cursor.clamped(payload_end);

    let exchange = format.exchange(&header, ctx.direction);
    let mut body = BodyContext::new(
        ctx.direction,
        exchange.map(|e| e.role),
        session.config().max_tlv_entries,
    );
    let key = match (exchange, header.transaction_id) {
        (Some(exchange), Some(id)) => correlation_key(format, session, ctx, message_ref, exchange, id),
        _ => None,
    };
    if let (Some(key), Some(Role::Response)) = (key, body.role) {
        let correlator = session.correlator();
        let handle = if ctx.first_pass {
            correlator.lookup_response(&key, message_ref)
        } else {
            correlator.find_by_message(message_ref)
        };
        body.request_params = handle
            .and_then(|h| correlator.get(h))
            .map(|pending| pending.params.clone());
    }

    // DispatchByType + DecodeFields
    let decoded = match format.select(&header, &body) {
        Some(entry) => {
            message.type_name = Some(entry.name);
            debug!(protocol, %message_ref, opcode = header.opcode, name = entry.name, "dispatch");
            (entry.decode)(&mut payload, &mut tree, &mut body)
        }
        None => {
            debug!(protocol, %message_ref, opcode = header.opcode, "unknown opcode");
            tree.opaque(
                &mut payload,
                format.opaque_descriptor(),
                Annotation::UnknownOpcode {
                    opcode: header.opcode,
                },
            );
            Ok(())
        }
    };

    let mut error = decoded.err();
    if error.is_none() && !payload.is_empty() {
        let count = payload.remaining();
        tree.opaque(
            &mut payload,
            format.opaque_descriptor(),
            Annotation::TrailingBytes { count },
        );
    }
    if overrun && error.is_none() {
        error = Some(DecodeError::LengthOverrun {
            protocol,
            declared: header.payload_len + header.trailer_len,
            available: cursor.limit() - payload_start,
        });
    }

    // ValidateChecksum runs whenever its bytes are present.
    if let (Some(spec), false) = (format.checksum(), overrun) {
        if let Ok(verdict) = checksum::validate(
            spec.algorithm,
            &cursor,
            start..payload_end,
            payload_end,
            spec.endian,
        ) {
            let field = tree.push(
                spec.descriptor,
                payload_end..payload_end + spec.algorithm.width(),
                FieldValue::UInt32(verdict.received),
            );
            if !verdict.is_valid() {
                debug!(protocol, %message_ref, computed = verdict.computed, received = verdict.received, "bad checksum");
                field.annotations.push(Annotation::BadChecksum {
                    computed: verdict.computed,
                    received: verdict.received,
                });
            }
            message.checksum = Some(verdict);
        }
    }

    // Correlate well-formed messages only.
    if error.is_none() {
        if let (Some(exchange), Some(key)) = (exchange, key) {
            message.transaction_id = Some(key.transaction_id);
            message.correlation = correlate(session, ctx, message_ref, exchange.role, key, &mut body);
        }
    }

    message.fields = tree.into_fields();
    message.annotations = body.annotations;
    message.error = error;
    if overrun {
        message.range = ctx.offset + start..ctx.offset + cursor.limit();
        (message, cursor.limit())
    } else {
        message.range = ctx.offset + start..ctx.offset + message_end;
        (message, message_end)
    }
}

fn correlation_key<F: MessageFormat + ?Sized>(
    format: &F,
    session: &mut AnalysisSession,
    ctx: &DecodeContext,
    message_ref: MessageRef,
    exchange: Exchange,
    wire_id: u32,
) -> Option<CorrelationKey> {
    let synthetic = format.key_policy() == KeyPolicy::SyntheticWhenZero
        && wire_id == 0
        && session.config().synthetic_ids;
    let transaction_id = if synthetic {
        let ids = session.synthetic_mut();
        let id = match (exchange.role, ctx.first_pass) {
            (Role::Request, true) => ids.for_request(ctx.conversation, message_ref),
            (Role::Response, true) => ids.for_response(ctx.conversation, message_ref)?,
            // Later passes only reuse what the first pass assigned.
            (_, false) => ids.assigned(message_ref)?,
        };
        TransactionId::Synthetic(id)
    } else {
        TransactionId::Wire(wire_id)
    };
    Some(CorrelationKey::new(
        ctx.conversation,
        transaction_id,
        exchange.response_type,
    ))
}

fn correlate(
    session: &mut AnalysisSession,
    ctx: &DecodeContext,
    message_ref: MessageRef,
    role: Role,
    key: CorrelationKey,
    body: &mut BodyContext,
) -> Option<CorrelationInfo> {
    let correlator = session.correlator_mut();
    match role {
        Role::Request => {
            let handle = if ctx.first_pass {
                Some(
                    correlator
                        .register_request(key, message_ref, ctx.timestamp_us, body.params.clone())
                        .handle,
                )
            } else {
                correlator.find_by_message(message_ref)
            };
            let pending = correlator.get(handle?)?;
            if let Some(previous) = pending.retransmit_of {
                body.annotations
                    .push(Annotation::RequestRetransmitted { previous });
            }
            Some(CorrelationInfo {
                role,
                transaction_id: key.transaction_id,
                peer: pending.response,
                elapsed_us: pending.elapsed_us(),
            })
        }
        Role::Response => {
            let outcome = if ctx.first_pass {
                correlator.match_response(key, message_ref, ctx.timestamp_us)?
            } else {
                correlator.recorded_response(message_ref)?
            };
            let pending = correlator.get(outcome.handle())?;
            let elapsed_us = match outcome {
                MatchOutcome::First(_) | MatchOutcome::Repeat(_) => pending.elapsed_us(),
                MatchOutcome::Duplicate(_) => {
                    if let Some(first_response) = pending.response {
                        body.annotations
                            .push(Annotation::DuplicateResponse { first_response });
                    }
                    None
                }
            };
            Some(CorrelationInfo {
                role,
                transaction_id: key.transaction_id,
                peer: Some(pending.request),
                elapsed_us,
            })
        }
    }
}
