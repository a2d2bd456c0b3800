//! Fuzz target for decoder selection.
//!
//! The first two bytes pick a destination port; the rest is handed to the
//! registry, which tries candidates until one accepts the buffer.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wiredissect_core::correlate::{AnalysisSession, ConversationId, SessionConfig};
use wiredissect_core::protocol::{default_registry, DecodeContext, HINT_DST_PORT};
use wiredissect_core::CollectingSink;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let port = u16::from_be_bytes([data[0], data[1]]);
    let payload = &data[2..];

    let mut registry = default_registry();
    registry.set_port_override(port, "telemetry");
    let mut session = AnalysisSession::new(SessionConfig::default());
    let mut ctx = DecodeContext::new(ConversationId(1), 1);
    ctx.insert_hint(HINT_DST_PORT, port as u64);

    if let Some((_, dissection)) = registry.dissect(payload, &ctx, &mut session) {
        let mut sink = CollectingSink::new();
        for message in dissection.messages() {
            message.emit(&mut sink);
        }
        assert_eq!(sink.records().len(), dissection.messages().len());
    }
});
