//! Substitute transaction ids for clients that always send zero.
//!
//! Each conversation owns a counter bumped once per new request. A response
//! takes the oldest outstanding id of its conversation, so requests and
//! responses still pair up by position. Every assignment is cached against
//! the message itself, which keeps re-analysis idempotent.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use super::{ConversationId, MessageRef};

#[derive(Debug, Default)]
struct Counter {
    next: u32,
    outstanding: VecDeque<u32>,
}

/// Per-session synthetic id allocator.
#[derive(Debug, Default)]
pub struct SyntheticIds {
    counters: HashMap<ConversationId, Counter>,
    assigned: HashMap<MessageRef, u32>,
}

impl SyntheticIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for a request, allocating one on first sight.
    pub fn for_request(&mut self, conversation: ConversationId, message: MessageRef) -> u32 {
        if let Some(&id) = self.assigned.get(&message) {
            return id;
        }
        let counter = self.counters.entry(conversation).or_default();
        counter.next = counter.next.wrapping_add(1);
        let id = counter.next;
        counter.outstanding.push_back(id);
        self.assigned.insert(message, id);
        trace!(%message, %conversation, id, "assigned synthetic request id");
        id
    }

    /// Id for a response: the oldest request id still waiting, if any.
    pub fn for_response(&mut self, conversation: ConversationId, message: MessageRef) -> Option<u32> {
        if let Some(&id) = self.assigned.get(&message) {
            return Some(id);
        }
        let id = self
            .counters
            .get_mut(&conversation)?
            .outstanding
            .pop_front()?;
        self.assigned.insert(message, id);
        trace!(%message, %conversation, id, "assigned synthetic response id");
        Some(id)
    }

    /// Id previously assigned to `message`.
    pub fn assigned(&self, message: MessageRef) -> Option<u32> {
        self.assigned.get(&message).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV: ConversationId = ConversationId(3);

    // Test 1: back-to-back requests, responses in order
    #[test]
    fn test_fifo_pairing() {
        let mut ids = SyntheticIds::new();
        let a = ids.for_request(CONV, MessageRef::new(1, 0));
        let b = ids.for_request(CONV, MessageRef::new(2, 0));
        assert_ne!(a, b);
        assert_eq!(ids.for_response(CONV, MessageRef::new(3, 0)), Some(a));
        assert_eq!(ids.for_response(CONV, MessageRef::new(4, 0)), Some(b));
        assert_eq!(ids.for_response(CONV, MessageRef::new(5, 0)), None);
    }

    // Test 2: revisiting a message returns the cached id
    #[test]
    fn test_cached_per_message() {
        let mut ids = SyntheticIds::new();
        let req = MessageRef::new(1, 0);
        let resp = MessageRef::new(2, 0);
        let a = ids.for_request(CONV, req);
        assert_eq!(ids.for_response(CONV, resp), Some(a));

        assert_eq!(ids.for_request(CONV, req), a);
        assert_eq!(ids.for_response(CONV, resp), Some(a));
        assert_eq!(ids.assigned(req), Some(a));
    }

    // Test 3: counters are scoped to the conversation
    #[test]
    fn test_conversations_disjoint() {
        let mut ids = SyntheticIds::new();
        ids.for_request(ConversationId(1), MessageRef::new(1, 0));
        assert_eq!(ids.for_response(ConversationId(2), MessageRef::new(2, 0)), None);
    }
}
