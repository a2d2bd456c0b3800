//! Fuzz target for the telemetry decoder.
//!
//! Covers the varint body length, the presence bitmap and TLV options
//! with per-tag header layouts.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wiredissect_core::correlate::{AnalysisSession, ConversationId, SessionConfig};
use wiredissect_core::protocol::{DecodeContext, Protocol, TelemetryProtocol};

fuzz_target!(|data: &[u8]| {
    let config = SessionConfig::default().with_max_tlv_entries(32);
    let mut session = AnalysisSession::new(config);
    let ctx = DecodeContext::new(ConversationId(1), 1).with_offset(14);

    let dissection = TelemetryProtocol.decode(data, &ctx, &mut session);
    for message in dissection.messages() {
        for field in &message.fields {
            assert!(field.range.start >= 14);
            assert!(field.range.end <= data.len() + 14);
        }
    }
});
