//! Link, network and transport header slicing.
//!
//! Walks Ethernet (with optional 802.1Q tags) or raw IP down to the UDP or
//! TCP payload. Anything else is skipped; this host only feeds application
//! payloads to the decoders.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Range;

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice};

/// Ethernet link type.
pub const LINKTYPE_ETHERNET: u16 = 1;
/// Raw IP link types (DLT_RAW as written by different platforms).
pub const LINKTYPE_RAW: [u16; 3] = [101, 228, 229];

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: [u16; 2] = [0x8100, 0x88A8];
const IP_PROTO_TCP: u8 = 6;
const IP_PROTO_UDP: u8 = 17;

/// Transport protocol of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    /// IP protocol number.
    pub fn ip_protocol(&self) -> u8 {
        match self {
            Transport::Tcp => IP_PROTO_TCP,
            Transport::Udp => IP_PROTO_UDP,
        }
    }
}

/// Addresses and payload location of one transport segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPayload {
    pub transport: Transport,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Payload bytes within the frame.
    pub range: Range<usize>,
}

/// Locate the UDP or TCP payload of a frame.
pub fn slice_transport(link_type: u16, frame: &[u8]) -> Option<TransportPayload> {
    let (ethertype, net_start) = match link_type {
        LINKTYPE_ETHERNET => link_header(frame)?,
        lt if LINKTYPE_RAW.contains(&lt) => match frame.first()? >> 4 {
            4 => (ETHERTYPE_IPV4, 0),
            6 => (ETHERTYPE_IPV6, 0),
            _ => return None,
        },
        _ => return None,
    };

    let net = frame.get(net_start..)?;
    let (src_ip, dst_ip, protocol, l4_start, l4_end) = match ethertype {
        ETHERTYPE_IPV4 => {
            let ip = Ipv4HeaderSlice::from_slice(net).ok()?;
            // Total length bounds the datagram; Ethernet padding follows it
            let end = (ip.total_len() as usize).clamp(ip.slice().len(), net.len());
            (
                IpAddr::V4(Ipv4Addr::from(ip.source())),
                IpAddr::V4(Ipv4Addr::from(ip.destination())),
                ip.protocol().0,
                net_start + ip.slice().len(),
                net_start + end,
            )
        }
        ETHERTYPE_IPV6 => {
            let ip = Ipv6HeaderSlice::from_slice(net).ok()?;
            let header_len = ip.slice().len();
            let end = (header_len + ip.payload_length() as usize).min(net.len());
            (
                IpAddr::V6(Ipv6Addr::from(ip.source())),
                IpAddr::V6(Ipv6Addr::from(ip.destination())),
                ip.next_header().0,
                net_start + header_len,
                net_start + end,
            )
        }
        _ => return None,
    };

    let segment = frame.get(l4_start..l4_end)?;
    let (transport, src_port, dst_port, header_len, segment_len) = match protocol {
        IP_PROTO_UDP => {
            let udp = UdpHeaderSlice::from_slice(segment).ok()?;
            let len = (udp.length() as usize).clamp(8, segment.len());
            (Transport::Udp, udp.source_port(), udp.destination_port(), 8, len)
        }
        IP_PROTO_TCP => {
            let tcp = TcpHeaderSlice::from_slice(segment).ok()?;
            (
                Transport::Tcp,
                tcp.source_port(),
                tcp.destination_port(),
                tcp.slice().len(),
                segment.len(),
            )
        }
        _ => return None,
    };

    Some(TransportPayload {
        transport,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        range: l4_start + header_len..l4_start + segment_len,
    })
}

/// Ethertype of the network layer and where it starts, after VLAN tags.
fn link_header(frame: &[u8]) -> Option<(u16, usize)> {
    let eth = Ethernet2HeaderSlice::from_slice(frame).ok()?;
    let mut ethertype = eth.ether_type().0;
    let mut offset = eth.slice().len();
    while ETHERTYPE_VLAN.contains(&ethertype) {
        let tag = frame.get(offset..offset + 4)?;
        ethertype = u16::from_be_bytes([tag[2], tag[3]]);
        offset += 4;
    }
    Some((ethertype, offset))
}
