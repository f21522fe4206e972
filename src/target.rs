//! Probe targets. Each is an immutable value built once; the packet it
//! carries is computed at construction and reused by every probe call.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::error::Result;
use crate::packet::{IcmpEchoPacket, TcpSynPacket};
use crate::prober::icmp::{self, WaitPolicy};
use crate::prober::syn::{self, SynOutcome};
use crate::prober::{ReadyMode, tcp_connect};
use crate::util::{parse_ipv4, timeout_from_secs};

/// A TCP port to check, plus the source endpoint written into the SYN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    source: SocketAddrV4,
    destination: SocketAddrV4,
    timeout: Duration,
    packet: TcpSynPacket,
}

impl ProbeTarget {
    /// `timeout_secs` of 0 selects the 3 second default.
    pub fn new(src_ip: &str, src_port: u16, dst_ip: &str, dst_port: u16, timeout_secs: f64) -> Result<Self> {
        let source = SocketAddrV4::new(parse_ipv4(src_ip, "src_ip")?, src_port);
        let destination = SocketAddrV4::new(parse_ipv4(dst_ip, "dst_ip")?, dst_port);
        let timeout = timeout_from_secs(timeout_secs)?;
        Ok(ProbeTarget {
            source,
            destination,
            timeout,
            packet: TcpSynPacket::new(source, destination),
        })
    }

    pub fn source(&self) -> SocketAddrV4 {
        self.source
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn packet(&self) -> &TcpSynPacket {
        &self.packet
    }

    /// Half-open check: true on SYN+ACK from the port.
    ///
    /// RST, or five datagrams without a reply from the port, give `false`.
    /// A receive that hits the socket timeout is an error.
    pub fn is_syn_ack_reachable(&self) -> Result<bool> {
        Ok(self.syn_outcome()?.is_open())
    }

    pub fn syn_outcome(&self) -> Result<SynOutcome> {
        syn::probe_syn(&self.packet, self.timeout)
    }

    /// Full connect check. A refused connection is `false`; any other connect
    /// failure, including a timeout, is an error.
    pub fn is_tcp_connectable(&self) -> Result<bool> {
        tcp_connect::probe_tcp(self.destination, self.timeout)
    }

    pub fn is_ready(&self, mode: ReadyMode) -> Result<bool> {
        match mode {
            ReadyMode::Connect => self.is_tcp_connectable(),
            ReadyMode::Raw => self.is_syn_ack_reachable(),
        }
    }
}

/// A host to ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpTarget {
    destination: Ipv4Addr,
    timeout: Duration,
    packet: IcmpEchoPacket,
    wait_policy: WaitPolicy,
}

impl IcmpTarget {
    pub fn new(dst_ip: &str, timeout_secs: f64) -> Result<Self> {
        Ok(IcmpTarget {
            destination: parse_ipv4(dst_ip, "dst_ip")?,
            timeout: timeout_from_secs(timeout_secs)?,
            packet: IcmpEchoPacket::new(),
            wait_policy: WaitPolicy::default(),
        })
    }

    pub fn with_wait_policy(mut self, wait_policy: WaitPolicy) -> Self {
        self.wait_policy = wait_policy;
        self
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn packet(&self) -> &IcmpEchoPacket {
        &self.packet
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait_policy
    }

    /// True once an echo reply arrives from the target.
    ///
    /// Unlike the TCP checks, silence is not `false`: when the wait elapses
    /// this returns an error for which `ProbeError::is_timeout` holds.
    pub fn is_icmp_reachable(&self) -> Result<bool> {
        icmp::probe_icmp(self)
    }
}
