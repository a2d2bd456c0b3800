//! Identity types used to scope and key correlation state.

use serde::Serialize;

/// Stable identity of one bidirectional flow, supplied by the host.
///
/// The core never derives this itself; a capture reader typically hashes a
/// normalized 5-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conv#{}", self.0)
    }
}

/// Identity of one message: the frame it arrived in and its position among
/// the messages packed into that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageRef {
    pub frame: u64,
    pub index: u32,
}

impl MessageRef {
    pub const fn new(frame: u64, index: u32) -> Self {
        Self { frame, index }
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.index == 0 {
            write!(f, "frame {}", self.frame)
        } else {
            write!(f, "frame {}.{}", self.frame, self.index)
        }
    }
}

/// Direction of a message relative to the server of its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToServer,
    ToClient,
    /// Neither endpoint is a known server.
    #[default]
    Unknown,
}

impl Direction {
    /// Return a string representation of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToServer => "to_server",
            Direction::ToClient => "to_client",
            Direction::Unknown => "unknown",
        }
    }
}

/// The transaction identifier half of a correlation key.
///
/// Wire ids and synthetic ids live in separate spaces so a counter value can
/// never collide with an id a client actually sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionId {
    Wire(u32),
    Synthetic(u32),
}

impl TransactionId {
    pub fn value(&self) -> u32 {
        match self {
            TransactionId::Wire(v) | TransactionId::Synthetic(v) => *v,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, TransactionId::Synthetic(_))
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionId::Wire(v) => write!(f, "{v}"),
            TransactionId::Synthetic(v) => write!(f, "~{v}"),
        }
    }
}

/// Composite key: (conversation, transaction id, expected response type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CorrelationKey {
    pub conversation: ConversationId,
    pub transaction_id: TransactionId,
    pub response_type: u32,
}

impl CorrelationKey {
    pub fn new(conversation: ConversationId, transaction_id: TransactionId, response_type: u32) -> Self {
        Self {
            conversation,
            transaction_id,
            response_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_is_exact() {
        let conv = ConversationId(9);
        let a = CorrelationKey::new(conv, TransactionId::Wire(1), 0x81);
        let b = CorrelationKey::new(conv, TransactionId::Wire(1), 0x81);
        let c = CorrelationKey::new(conv, TransactionId::Synthetic(1), 0x81);
        let d = CorrelationKey::new(conv, TransactionId::Wire(1), 0x82);
        let e = CorrelationKey::new(ConversationId(10), TransactionId::Wire(1), 0x81);

        let set: HashSet<_> = [a, b, c, d, e].into_iter().collect();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageRef::new(12, 0).to_string(), "frame 12");
        assert_eq!(MessageRef::new(12, 2).to_string(), "frame 12.2");
        assert_eq!(TransactionId::Synthetic(3).to_string(), "~3");
        assert_eq!(Direction::default(), Direction::Unknown);
    }
}
