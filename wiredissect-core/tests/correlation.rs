//! Request/response correlation across frames and analysis passes.

use wiredissect_core::correlate::{
    CorrelationKey, MatchOutcome, RequestParams, TransactionCorrelator, TransactionId,
};
use wiredissect_core::prelude::*;
use wiredissect_core::protocol::{regbus, Role};
use wiredissect_core::wire::checksum::masked_ones_complement16;

const CONVERSATION: ConversationId = ConversationId(7);

fn regbus_message(msg_type: u8, sequence: u8, payload: &[u8]) -> Vec<u8> {
    let mut msg = vec![0x52, 0x42, msg_type, sequence];
    msg.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    msg.extend_from_slice(payload);
    let checksum = masked_ones_complement16(&msg);
    msg.extend_from_slice(&checksum.to_be_bytes());
    msg
}

/// Request in frame 1, its answer in frame 2, a second answer in frame 3.
fn capture() -> Vec<(u64, Direction, Vec<u8>)> {
    vec![
        (
            1,
            Direction::ToServer,
            regbus_message(regbus::message_type::READ_REGISTER, 5, &[regbus::register::TEMPERATURE]),
        ),
        (
            2,
            Direction::ToClient,
            regbus_message(regbus::message_type::READ_REGISTER_RESPONSE, 5, &[0x00, 0xFA]),
        ),
        (
            3,
            Direction::ToClient,
            regbus_message(regbus::message_type::READ_REGISTER_RESPONSE, 5, &[0x00, 0xFB]),
        ),
    ]
}

fn run_pass(
    registry: &ProtocolRegistry,
    session: &mut AnalysisSession,
    first_pass: bool,
) -> Vec<MessageRecord> {
    run_frames(registry, session, capture(), first_pass)
}

fn run_frames(
    registry: &ProtocolRegistry,
    session: &mut AnalysisSession,
    frames: Vec<(u64, Direction, Vec<u8>)>,
    first_pass: bool,
) -> Vec<MessageRecord> {
    let mut sink = CollectingSink::new();
    for (frame, direction, data) in frames {
        let mut ctx = DecodeContext::new(CONVERSATION, frame)
            .with_timestamp(frame * 250_000)
            .with_direction(direction)
            .with_first_pass(first_pass);
        ctx.insert_hint(HINT_DST_PORT, regbus::REGBUS_PORT as u64);
        let (_, dissection) = registry
            .dissect(&data, &ctx, session)
            .expect("regbus datagram");
        for message in dissection.messages() {
            message.emit(&mut sink);
        }
    }
    sink.into_records()
}

fn key(id: u32) -> CorrelationKey {
    CorrelationKey::new(
        CONVERSATION,
        TransactionId::Wire(id),
        regbus::message_type::READ_REGISTER_RESPONSE as u32,
    )
}

// ============================================================================
// Correlator
// ============================================================================

#[test]
fn test_register_is_idempotent() {
    let mut correlator = TransactionCorrelator::new();
    let request = MessageRef::new(1, 0);

    let first = correlator.register_request(key(5), request, 100, RequestParams::new());
    let again = correlator.register_request(key(5), request, 100, RequestParams::new());
    assert_eq!(first, again);
    assert_eq!(correlator.len(), 1);
}

#[test]
fn test_first_response_wins() {
    let mut correlator = TransactionCorrelator::new();
    let request = MessageRef::new(1, 0);
    let answer = MessageRef::new(2, 0);
    let late = MessageRef::new(3, 0);
    correlator.register_request(key(5), request, 100, RequestParams::new());

    let outcome = correlator.match_response(key(5), answer, 400).unwrap();
    assert!(matches!(outcome, MatchOutcome::First(_)));
    let outcome = correlator.match_response(key(5), late, 900).unwrap();
    assert!(outcome.is_duplicate());

    // Offering both again changes nothing
    assert!(matches!(
        correlator.match_response(key(5), answer, 400),
        Some(MatchOutcome::Repeat(_))
    ));
    assert!(correlator.match_response(key(5), late, 900).unwrap().is_duplicate());

    let pending = correlator.get(outcome.handle()).unwrap();
    assert_eq!(pending.request, request);
    assert_eq!(pending.response, Some(answer));
    assert_eq!(pending.elapsed_us(), Some(300));
    assert!(correlator.match_response(key(6), answer, 400).is_none());
}

#[test]
fn test_retransmitted_request_takes_the_key() {
    let mut correlator = TransactionCorrelator::new();
    let original = MessageRef::new(1, 0);
    let resend = MessageRef::new(2, 0);
    correlator.register_request(key(5), original, 0, RequestParams::new());
    let registration = correlator.register_request(key(5), resend, 10, RequestParams::new());
    assert_eq!(registration.replaced, Some(original));

    let outcome = correlator.match_response(key(5), MessageRef::new(3, 0), 20).unwrap();
    assert_eq!(correlator.get(outcome.handle()).unwrap().request, resend);
    assert_eq!(correlator.unmatched().count(), 1);
    assert!(correlator.find_by_message(original).is_some());
}

// ============================================================================
// Two passes
// ============================================================================

#[test]
fn test_second_pass_is_stable() {
    let registry = default_registry();
    let mut session = AnalysisSession::new(SessionConfig::default());

    let first = run_pass(&registry, &mut session, true);
    let second = run_pass(&registry, &mut session, false);
    let third = run_pass(&registry, &mut session, false);

    assert_eq!(session.correlator().len(), 1);
    let summaries = |records: &[MessageRecord]| records.iter().map(|r| r.summary.clone()).collect::<Vec<_>>();
    assert_eq!(summaries(&second), summaries(&third));

    // Only the request learns about its answer after the first pass
    assert_eq!(first[0].correlation.as_ref().unwrap().peer, None);
    assert_eq!(
        second[0].correlation.as_ref().unwrap().peer,
        Some(MessageRef::new(2, 0))
    );
    assert_eq!(summaries(&first)[1..], summaries(&second)[1..]);
}

#[test]
fn test_response_before_request_stays_uncorrelated() {
    let registry = default_registry();
    let mut session = AnalysisSession::new(SessionConfig::default());
    let frames = || {
        vec![
            (
                1,
                Direction::ToClient,
                regbus_message(regbus::message_type::READ_REGISTER_RESPONSE, 5, &[0x00, 0xFA]),
            ),
            (
                2,
                Direction::ToServer,
                regbus_message(regbus::message_type::READ_REGISTER, 5, &[regbus::register::TEMPERATURE]),
            ),
        ]
    };

    let first = run_frames(&registry, &mut session, frames(), true);
    let second = run_frames(&registry, &mut session, frames(), false);

    for records in [&first, &second] {
        let answer = &records[0];
        assert!(answer.correlation.is_none());
        assert!(answer.field("regbus.reg.temperature").is_none());
        assert!(!answer.summary.contains("DUPLICATE"));

        let request = records[1].correlation.as_ref().unwrap();
        assert_eq!(request.peer, None);
        assert_eq!(request.elapsed_us, None);
    }
    assert_eq!(first[0].summary, second[0].summary);
    assert_eq!(session.correlator().unmatched().count(), 1);
}

#[test]
fn test_response_interpreted_with_request() {
    let registry = default_registry();
    let mut session = AnalysisSession::new(SessionConfig::default());
    run_pass(&registry, &mut session, true);
    let records = run_pass(&registry, &mut session, false);

    let answer = &records[1];
    assert_eq!(answer.field("regbus.reg.temperature").unwrap().rendered, "25.0 C");
    let info = answer.correlation.as_ref().unwrap();
    assert_eq!(info.role, Role::Response);
    assert_eq!(info.peer, Some(MessageRef::new(1, 0)));
    assert_eq!(info.elapsed_us, Some(250_000));
    assert!(!answer.summary.contains("DUPLICATE"));
}

#[test]
fn test_duplicate_response_flagged_every_pass() {
    let registry = default_registry();
    let mut session = AnalysisSession::new(SessionConfig::default());

    for first_pass in [true, false, false] {
        let records = run_pass(&registry, &mut session, first_pass);
        let late = &records[2];
        assert!(late.summary.ends_with("[DUPLICATE RESPONSE]"), "{}", late.summary);
        assert!(late.annotations.contains(&Annotation::DuplicateResponse {
            first_response: MessageRef::new(2, 0)
        }));
        assert_eq!(late.correlation.as_ref().unwrap().elapsed_us, None);
    }
}

#[test]
fn test_record_json_shape() {
    let registry = default_registry();
    let mut session = AnalysisSession::new(SessionConfig::default());
    let records = run_pass(&registry, &mut session, true);

    let json = serde_json::to_value(&records[1]).unwrap();
    assert_eq!(json["direction"], "to_client");
    assert_eq!(json["correlation"]["role"], "response");
    assert_eq!(json["transaction_id"]["wire"], 5);
}
