//! Fuzz target for the Modbus/TCP decoder.
//!
//! Every ADU is decoded twice, once per direction, with zero transaction
//! ids taking the synthetic-id path.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wiredissect_core::correlate::{AnalysisSession, ConversationId, Direction, SessionConfig};
use wiredissect_core::protocol::{DecodeContext, ModbusProtocol, Protocol};

fuzz_target!(|data: &[u8]| {
    let mut session = AnalysisSession::new(SessionConfig::default());

    for (frame, direction) in [(1, Direction::ToServer), (2, Direction::ToClient), (3, Direction::Unknown)] {
        let ctx = DecodeContext::new(ConversationId(1), frame).with_direction(direction);
        let dissection = ModbusProtocol.decode(data, &ctx, &mut session);
        for message in dissection.messages() {
            for field in &message.fields {
                assert!(field.range.end <= data.len());
            }
        }
    }

    if let Some(len) = ModbusProtocol.message_length(data) {
        assert!(len >= 6);
    }
});
