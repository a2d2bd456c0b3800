//! Fuzz target for the RegBus decoder.
//!
//! Exercises:
//! - Multi-message datagrams and the per-buffer message limit
//! - Register catalogs with fixed, length-prefixed and unwalkable values
//! - Read responses interpreted through a request seen earlier

#![no_main]

use libfuzzer_sys::fuzz_target;
use wiredissect_core::correlate::{AnalysisSession, ConversationId, Direction, SessionConfig};
use wiredissect_core::protocol::{DecodeContext, Protocol, RegBusProtocol};

fuzz_target!(|data: &[u8]| {
    let mut session = AnalysisSession::new(SessionConfig::default());

    // The first half decoded as a request stream, the second as answers
    let (requests, responses) = data.split_at(data.len() / 2);
    for (frame, (buf, direction)) in [(requests, Direction::ToServer), (responses, Direction::ToClient)]
        .into_iter()
        .enumerate()
    {
        let ctx = DecodeContext::new(ConversationId(1), frame as u64 + 1).with_direction(direction);
        let dissection = RegBusProtocol.decode(buf, &ctx, &mut session);
        for message in dissection.messages() {
            assert!(message.range.end <= buf.len());
            for field in &message.fields {
                assert!(field.range.start <= field.range.end && field.range.end <= buf.len());
            }
            let _ = message.summary();
        }
    }
});
