//! Wire formats: the TCP SYN segment and ICMP echo request we send, and
//! read-only views over the IPv4 datagrams a raw socket hands back.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::checksum::checksum;

pub const IPPROTO_TCP: u8 = 6;

pub const TCP_HEADER_LEN: usize = 20;
pub const PSEUDO_HEADER_LEN: usize = 12;
pub const ICMP_HEADER_LEN: usize = 8;
pub const MIN_IPV4_HEADER_LEN: usize = 20;

pub const SYN_SEQUENCE: u32 = 1;
pub const SYN_WINDOW: u16 = 4321;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// TCP control bits as they sit in byte 13 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const ACK: u8 = 0x10;

    pub fn from_bits(bits: u8) -> Self {
        TcpFlags(bits)
    }

    pub fn syn(self) -> bool {
        self.0 & Self::SYN != 0
    }

    pub fn ack(self) -> bool {
        self.0 & Self::ACK != 0
    }

    pub fn rst(self) -> bool {
        self.0 & Self::RST != 0
    }
}

/// A SYN segment built once per target and reused for every send.
///
/// Only `header` goes on the wire. The pseudo-header exists solely while the
/// checksum is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSynPacket {
    header: [u8; TCP_HEADER_LEN],
    destination: SocketAddrV4,
}

impl TcpSynPacket {
    pub fn new(source: SocketAddrV4, destination: SocketAddrV4) -> Self {
        let mut header = [0u8; TCP_HEADER_LEN];
        header[0..2].copy_from_slice(&source.port().to_be_bytes());
        header[2..4].copy_from_slice(&destination.port().to_be_bytes());
        header[4..8].copy_from_slice(&SYN_SEQUENCE.to_be_bytes());
        // acknowledgment stays zero
        header[12] = 5 << 4;
        header[13] = TcpFlags::SYN;
        header[14..16].copy_from_slice(&SYN_WINDOW.to_be_bytes());
        // checksum (16..18) and urgent pointer (18..20) stay zero for now

        let pseudo = pseudo_header(*source.ip(), *destination.ip(), TCP_HEADER_LEN as u16);
        let mut region = [0u8; PSEUDO_HEADER_LEN + TCP_HEADER_LEN];
        region[..PSEUDO_HEADER_LEN].copy_from_slice(&pseudo);
        region[PSEUDO_HEADER_LEN..].copy_from_slice(&header);
        header[16..18].copy_from_slice(&checksum(&region).to_be_bytes());

        TcpSynPacket {
            header,
            destination,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.header
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.header[16], self.header[17]])
    }
}

/// The 12-byte IPv4 pseudo-header covered by the TCP checksum.
pub fn pseudo_header(source: Ipv4Addr, destination: Ipv4Addr, segment_len: u16) -> [u8; PSEUDO_HEADER_LEN] {
    let mut pseudo = [0u8; PSEUDO_HEADER_LEN];
    pseudo[0..4].copy_from_slice(&source.octets());
    pseudo[4..8].copy_from_slice(&destination.octets());
    pseudo[9] = IPPROTO_TCP;
    pseudo[10..12].copy_from_slice(&segment_len.to_be_bytes());
    pseudo
}

/// Echo request with identifier and sequence both zero and no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpEchoPacket {
    header: [u8; ICMP_HEADER_LEN],
}

impl IcmpEchoPacket {
    pub fn new() -> Self {
        let mut header = [0u8; ICMP_HEADER_LEN];
        header[0] = ICMP_ECHO_REQUEST;
        let sum = checksum(&header);
        header[2..4].copy_from_slice(&sum.to_be_bytes());
        IcmpEchoPacket { header }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.header
    }
}

impl Default for IcmpEchoPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields of an IPv4+TCP datagram that classification looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegmentView {
    pub source: Ipv4Addr,
    pub source_port: u16,
    pub flags: TcpFlags,
}

impl TcpSegmentView {
    /// Returns `None` for anything too short to hold the IP header its own
    /// IHL field announces plus a full TCP header.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let (source, payload) = split_ipv4(datagram)?;
        if payload.len() < TCP_HEADER_LEN {
            return None;
        }
        Some(TcpSegmentView {
            source,
            source_port: u16::from_be_bytes([payload[0], payload[1]]),
            flags: TcpFlags::from_bits(payload[13]),
        })
    }
}

/// Fields of an IPv4+ICMP datagram that classification looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpMessageView {
    pub source: Ipv4Addr,
    pub icmp_type: u8,
    pub code: u8,
}

impl IcmpMessageView {
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let (source, payload) = split_ipv4(datagram)?;
        if payload.len() < 2 {
            return None;
        }
        Some(IcmpMessageView {
            source,
            icmp_type: payload[0],
            code: payload[1],
        })
    }
}

/// Source address and everything after the IPv4 header (IHL x 4 bytes).
fn split_ipv4(datagram: &[u8]) -> Option<(Ipv4Addr, &[u8])> {
    if datagram.len() < MIN_IPV4_HEADER_LEN {
        return None;
    }
    let ihl = ((datagram[0] & 0x0F) as usize) * 4;
    if ihl < MIN_IPV4_HEADER_LEN || datagram.len() < ihl {
        return None;
    }
    let source = Ipv4Addr::new(datagram[12], datagram[13], datagram[14], datagram[15]);
    Some((source, &datagram[ihl..]))
}
