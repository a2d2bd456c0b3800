//! Capture file reading and transport demultiplexing.
//!
//! This module handles:
//! - Reading PCAP and PCAPNG files into [`RawPacket`]s
//! - Slicing link, network and transport headers down to the payload
//! - Grouping payloads into conversations and telling client from server

mod conversation;
mod packet;
mod reader;
mod transport;

pub use conversation::{ConversationTable, Endpoint};
pub use packet::RawPacket;
pub use reader::CaptureReader;
pub use transport::{slice_transport, Transport, TransportPayload};
