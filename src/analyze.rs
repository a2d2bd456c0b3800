//! Two-pass analysis of a capture.
//!
//! The first pass registers every request with the correlator. The second
//! pass sees the same frames with `first_pass = false`, so a request can
//! point at a response that appears later in the capture.

use tracing::{info, trace};
use wiredissect_core::protocol::{HINT_DST_PORT, HINT_SRC_PORT, HINT_TRANSPORT};
use wiredissect_core::{
    AnalysisSession, BuiltinProtocol, ConversationId, DecodeContext, DecodedMessage, Direction, Dissection,
    Protocol, ProtocolRegistry, SessionConfig,
};

use crate::capture::{slice_transport, ConversationTable, Endpoint, RawPacket, Transport};

/// Where a decoded message came from.
#[derive(Debug, Clone)]
pub struct FrameMeta {
    pub frame: u64,
    pub timestamp_us: u64,
    pub conversation: ConversationId,
    pub direction: Direction,
    pub transport: Transport,
    pub src: Endpoint,
    pub dst: Endpoint,
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub frames: u64,
    pub payloads: u64,
    pub messages: u64,
    pub malformed: u64,
    /// Payloads no decoder accepted.
    pub undecoded: u64,
}

/// Runs capture frames through the registry with one session.
pub struct Analyzer {
    registry: ProtocolRegistry,
    forced: Option<BuiltinProtocol>,
    session: AnalysisSession,
    conversations: ConversationTable,
}

impl Analyzer {
    pub fn new(registry: ProtocolRegistry, config: SessionConfig) -> Self {
        let conversations = ConversationTable::new(registry.server_ports());
        Self {
            registry,
            forced: None,
            session: AnalysisSession::new(config),
            conversations,
        }
    }

    /// Decode every payload with the named decoder instead of choosing by
    /// port. Returns false for an unknown name.
    pub fn force_protocol(&mut self, name: &str) -> bool {
        self.forced = self.registry.get(name).copied();
        self.forced.is_some()
    }

    pub fn session(&self) -> &AnalysisSession {
        &self.session
    }

    pub fn conversations(&self) -> &ConversationTable {
        &self.conversations
    }

    /// Decode every frame once, handing each message to `visit`.
    pub fn run_pass<F>(&mut self, packets: &[RawPacket], first_pass: bool, mut visit: F) -> PassStats
    where
        F: FnMut(&FrameMeta, &DecodedMessage<'_>),
    {
        let mut stats = PassStats::default();
        for packet in packets {
            stats.frames += 1;
            let Some(seg) = slice_transport(packet.link_type, &packet.data) else {
                trace!(frame = packet.frame_number, "no transport payload");
                continue;
            };
            if seg.range.is_empty() {
                continue;
            }
            stats.payloads += 1;

            let meta = FrameMeta {
                frame: packet.frame_number,
                timestamp_us: packet.timestamp_us,
                conversation: self.conversations.conversation(&seg),
                direction: self.conversations.direction(&seg),
                transport: seg.transport,
                src: (seg.src_ip, seg.src_port),
                dst: (seg.dst_ip, seg.dst_port),
            };
            let mut ctx = DecodeContext::new(meta.conversation, meta.frame)
                .with_timestamp(meta.timestamp_us)
                .with_direction(meta.direction)
                .with_first_pass(first_pass)
                .with_offset(seg.range.start);
            ctx.insert_hint(HINT_SRC_PORT, seg.src_port as u64);
            ctx.insert_hint(HINT_DST_PORT, seg.dst_port as u64);
            ctx.insert_hint(HINT_TRANSPORT, seg.transport.ip_protocol() as u64);

            let payload = &packet.data[seg.range];
            let dissection = match &self.forced {
                Some(decoder) => Some(decoder.decode(payload, &ctx, &mut self.session))
                    .filter(|d| !d.is_not_this_protocol()),
                None => self
                    .registry
                    .dissect(payload, &ctx, &mut self.session)
                    .map(|(_, d)| d),
            };
            let Some(dissection) = dissection else {
                stats.undecoded += 1;
                continue;
            };

            if matches!(dissection, Dissection::Malformed { .. }) {
                stats.malformed += 1;
            }
            for message in dissection.messages() {
                stats.messages += 1;
                visit(&meta, message);
            }
        }
        info!(
            first_pass,
            frames = stats.frames,
            messages = stats.messages,
            malformed = stats.malformed,
            undecoded = stats.undecoded,
            conversations = self.conversations.len(),
            "pass complete"
        );
        stats
    }
}
