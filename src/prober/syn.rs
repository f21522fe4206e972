use std::net::SocketAddrV4;
use std::time::Duration;

use socket2::Protocol;
use tracing::{debug, trace};

use crate::channel::{DatagramChannel, RawChannel};
use crate::error::{ProbeError, Result};
use crate::packet::{TcpSegmentView, TcpSynPacket};

/// Datagrams read before giving up on a reply.
pub const MAX_RECEIVE_ATTEMPTS: usize = 5;

const RECV_BUFFER_LEN: usize = 4096;

/// What a single received datagram says about the probed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NotFound,
    SynAckFound,
    RstFound,
}

/// Terminal state of a SYN probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynOutcome {
    /// SYN+ACK came back from the target port.
    Listening,
    /// RST came back from the target port.
    Closed,
    /// No SYN+ACK or RST among the datagrams read.
    Unresponsive,
}

impl SynOutcome {
    pub fn is_open(self) -> bool {
        self == SynOutcome::Listening
    }
}

/// The raw socket sees every inbound TCP segment on the host, so a reply only
/// counts when it comes from the probed address and port.
pub fn classify(datagram: &[u8], target: SocketAddrV4) -> Classification {
    let Some(segment) = TcpSegmentView::parse(datagram) else {
        return Classification::NotFound;
    };
    if segment.source != *target.ip() || segment.source_port != target.port() {
        return Classification::NotFound;
    }
    if segment.flags.syn() && segment.flags.ack() {
        Classification::SynAckFound
    } else if segment.flags.rst() {
        Classification::RstFound
    } else {
        Classification::NotFound
    }
}

/// Opens a raw TCP socket and runs the probe on it.
pub fn probe_syn(packet: &TcpSynPacket, timeout: Duration) -> Result<SynOutcome> {
    let channel = RawChannel::open(Protocol::TCP, timeout)?;
    run(channel, packet)
}

/// Sends `packet` once, then reads up to [`MAX_RECEIVE_ATTEMPTS`] datagrams.
///
/// Takes the channel by value: it is dropped, and its socket closed, on every
/// return path.
pub fn run<C: DatagramChannel>(channel: C, packet: &TcpSynPacket) -> Result<SynOutcome> {
    let target = packet.destination();

    channel
        .send_to(packet.as_bytes(), target)
        .map_err(|e| ProbeError::system(e, "sendto failed"))?;
    trace!(dst = %target, "syn sent");

    let mut buf = [0u8; RECV_BUFFER_LEN];
    for attempt in 0..MAX_RECEIVE_ATTEMPTS {
        let (n, _from) = channel
            .recv_from(&mut buf)
            .map_err(|e| ProbeError::system(e, "recvfrom failed"))?;

        match classify(&buf[..n], target) {
            Classification::SynAckFound => {
                debug!(dst = %target, attempt, "syn-ack received");
                return Ok(SynOutcome::Listening);
            }
            Classification::RstFound => {
                debug!(dst = %target, attempt, "rst received");
                return Ok(SynOutcome::Closed);
            }
            Classification::NotFound => {
                trace!(dst = %target, attempt, len = n, "unrelated datagram ignored");
            }
        }
    }

    debug!(dst = %target, "no reply within {} datagrams", MAX_RECEIVE_ATTEMPTS);
    Ok(SynOutcome::Unresponsive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TcpFlags;
    use crate::packet::tests::tcp_reply;
    use crate::prober::testing::ScriptedChannel;
    use std::io;
    use std::net::Ipv4Addr;

    const TARGET_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn packet() -> TcpSynPacket {
        TcpSynPacket::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 54321),
            SocketAddrV4::new(TARGET_IP, 6379),
        )
    }

    #[test]
    fn classify_requires_matching_address_and_port() {
        let target = SocketAddrV4::new(TARGET_IP, 6379);
        let syn_ack = TcpFlags::SYN | TcpFlags::ACK;

        assert_eq!(classify(&tcp_reply(TARGET_IP, 6379, syn_ack), target), Classification::SynAckFound);
        assert_eq!(classify(&tcp_reply(TARGET_IP, 6379, TcpFlags::RST | TcpFlags::ACK), target), Classification::RstFound);
        assert_eq!(classify(&tcp_reply(TARGET_IP, 6380, syn_ack), target), Classification::NotFound);
        assert_eq!(
            classify(&tcp_reply(Ipv4Addr::new(10, 0, 0, 9), 6379, syn_ack), target),
            Classification::NotFound
        );
        // plain ACK or bare SYN from the target is inconclusive
        assert_eq!(classify(&tcp_reply(TARGET_IP, 6379, TcpFlags::ACK), target), Classification::NotFound);
        assert_eq!(classify(&tcp_reply(TARGET_IP, 6379, TcpFlags::SYN), target), Classification::NotFound);
        assert_eq!(classify(&[0x45, 0, 0], target), Classification::NotFound);
    }

    #[test]
    fn syn_ack_means_listening() {
        let (channel, drops) = ScriptedChannel::new(vec![Ok(tcp_reply(TARGET_IP, 6379, TcpFlags::SYN | TcpFlags::ACK))]);
        let sent = channel.sent.clone();

        assert_eq!(run(channel, &packet()).unwrap(), SynOutcome::Listening);
        assert_eq!(drops.get(), 1);

        let sent = sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, packet().as_bytes());
        assert_eq!(sent[0].1, SocketAddrV4::new(TARGET_IP, 6379));
    }

    #[test]
    fn rst_means_closed() {
        let (channel, drops) = ScriptedChannel::new(vec![Ok(tcp_reply(TARGET_IP, 6379, TcpFlags::RST | TcpFlags::ACK))]);
        let outcome = run(channel, &packet()).unwrap();
        assert_eq!(outcome, SynOutcome::Closed);
        assert!(!outcome.is_open());
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn unrelated_traffic_is_skipped_until_match() {
        let noise = tcp_reply(Ipv4Addr::new(192, 168, 0, 7), 443, TcpFlags::ACK);
        let (channel, drops) = ScriptedChannel::new(vec![
            Ok(noise.clone()),
            Ok(noise.clone()),
            Ok(tcp_reply(TARGET_IP, 6379, TcpFlags::SYN | TcpFlags::ACK)),
        ]);
        assert_eq!(run(channel, &packet()).unwrap(), SynOutcome::Listening);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn five_unrelated_datagrams_mean_unresponsive() {
        let noise = tcp_reply(Ipv4Addr::new(192, 168, 0, 7), 443, TcpFlags::ACK);
        let mut script: Vec<io::Result<Vec<u8>>> = (0..MAX_RECEIVE_ATTEMPTS).map(|_| Ok(noise.clone())).collect();
        // a sixth reply that would match must never be read
        script.push(Ok(tcp_reply(TARGET_IP, 6379, TcpFlags::SYN | TcpFlags::ACK)));
        let (channel, drops) = ScriptedChannel::new(script);
        let reads = channel.reads.clone();

        assert_eq!(run(channel, &packet()).unwrap(), SynOutcome::Unresponsive);
        assert_eq!(reads.get(), MAX_RECEIVE_ATTEMPTS);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn send_failure_is_fatal_and_closes() {
        let (mut channel, drops) = ScriptedChannel::new(vec![]);
        channel.send_error = Some(libc::EPERM);
        let reads = channel.reads.clone();

        let err = run(channel, &packet()).unwrap_err();
        assert_eq!(err.errno(), Some(libc::EPERM));
        assert!(err.to_string().contains("sendto failed"));
        assert_eq!(reads.get(), 0);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn receive_failure_is_fatal_and_closes() {
        let (channel, drops) = ScriptedChannel::new(vec![
            Ok(tcp_reply(Ipv4Addr::new(192, 168, 0, 7), 443, TcpFlags::ACK)),
            Err(io::Error::from_raw_os_error(libc::EAGAIN)),
        ]);
        let err = run(channel, &packet()).unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("recvfrom failed"));
        assert_eq!(drops.get(), 1);
    }

    #[test]
    #[ignore = "needs CAP_NET_RAW"]
    fn closed_loopback_port_answers_rst() {
        let packet = TcpSynPacket::new(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 54321),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1),
        );
        let outcome = probe_syn(&packet, Duration::from_secs(1)).unwrap();
        assert_ne!(outcome, SynOutcome::Listening);
    }
}
