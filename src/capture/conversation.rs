//! Conversation identity and message direction.

use std::collections::HashMap;
use std::net::IpAddr;

use wiredissect_core::{ConversationId, Direction};

use super::{Transport, TransportPayload};

/// One side of a conversation.
pub type Endpoint = (IpAddr, u16);

/// Assigns a [`ConversationId`] to each normalized 5-tuple.
///
/// Ids are handed out in first-seen order starting at 1, so replaying the
/// same capture yields the same ids.
#[derive(Debug, Default)]
pub struct ConversationTable {
    ids: HashMap<(Transport, Endpoint, Endpoint), ConversationId>,
    server_ports: Vec<u16>,
}

impl ConversationTable {
    /// Create a table that treats `server_ports` as server endpoints.
    pub fn new(server_ports: Vec<u16>) -> Self {
        Self {
            ids: HashMap::new(),
            server_ports,
        }
    }

    /// Conversation of a payload; both directions map to the same id.
    pub fn conversation(&mut self, seg: &TransportPayload) -> ConversationId {
        let a = (seg.src_ip, seg.src_port);
        let b = (seg.dst_ip, seg.dst_port);
        let key = if a <= b { (seg.transport, a, b) } else { (seg.transport, b, a) };
        let next = ConversationId(self.ids.len() as u64 + 1);
        *self.ids.entry(key).or_insert(next)
    }

    /// Direction by well-known server port. The destination port wins when
    /// both ports are known.
    pub fn direction(&self, seg: &TransportPayload) -> Direction {
        if self.server_ports.contains(&seg.dst_port) {
            Direction::ToServer
        } else if self.server_ports.contains(&seg.src_port) {
            Direction::ToClient
        } else {
            Direction::Unknown
        }
    }

    /// Number of conversations seen.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(src: (&str, u16), dst: (&str, u16)) -> TransportPayload {
        TransportPayload {
            transport: Transport::Tcp,
            src_ip: src.0.parse().unwrap(),
            dst_ip: dst.0.parse().unwrap(),
            src_port: src.1,
            dst_port: dst.1,
            range: 0..0,
        }
    }

    // Test 1: both directions share an id
    #[test]
    fn test_normalized() {
        let mut table = ConversationTable::new(vec![502]);
        let request = seg(("10.0.0.1", 40000), ("10.0.0.2", 502));
        let reply = seg(("10.0.0.2", 502), ("10.0.0.1", 40000));
        let other = seg(("10.0.0.3", 40000), ("10.0.0.2", 502));

        let id = table.conversation(&request);
        assert_eq!(id, ConversationId(1));
        assert_eq!(table.conversation(&reply), id);
        assert_eq!(table.conversation(&other), ConversationId(2));
        assert_eq!(table.len(), 2);

        assert_eq!(table.direction(&request), Direction::ToServer);
        assert_eq!(table.direction(&reply), Direction::ToClient);
    }

    // Test 2: no known port
    #[test]
    fn test_unknown_direction() {
        let table = ConversationTable::new(vec![502]);
        assert_eq!(
            table.direction(&seg(("10.0.0.1", 1), ("10.0.0.2", 2))),
            Direction::Unknown
        );
    }
}
