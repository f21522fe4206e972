use std::io;
use std::net::SocketAddrV4;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use socket2::Protocol;
use tracing::{debug, trace};

use crate::channel::{DatagramChannel, Epoll, RawChannel, Readiness};
use crate::error::{ProbeError, Result};
use crate::packet::{ICMP_ECHO_REPLY, IcmpMessageView};
use crate::target::IcmpTarget;

const RECV_BUFFER_LEN: usize = 1500;

/// How the configured timeout bounds the wait for an echo reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Every wait gets the full timeout again. A run of wakeups that find
    /// nothing to read, or of unrelated ICMP traffic, can stretch the call
    /// past the configured timeout.
    #[default]
    PerWait,
    /// One deadline for the whole call; each wait gets what is left of it,
    /// and once it has passed the call fails even if more traffic is queued.
    Deadline,
}

/// Opens a raw ICMP socket, sends one echo request and waits for the reply.
pub fn probe_icmp(target: &IcmpTarget) -> Result<bool> {
    let channel = RawChannel::open(Protocol::ICMPV4, target.timeout())?;
    run(channel, |ch| Epoll::watch(ch.as_raw_fd()), target)
}

/// Probe loop over any channel. `watch` builds the readiness set once the
/// request has been sent; both it and `channel` are dropped on every return.
///
/// A wait that elapses with nothing readable is an error
/// (`ProbeError::is_timeout`), not `Ok(false)`.
pub fn run<C, R, F>(channel: C, watch: F, target: &IcmpTarget) -> Result<bool>
where
    C: DatagramChannel,
    R: Readiness,
    F: FnOnce(&C) -> Result<R>,
{
    let destination = target.destination();
    let timeout = target.timeout();

    channel
        .send_to(target.packet().as_bytes(), SocketAddrV4::new(destination, 0))
        .map_err(|e| ProbeError::system(e, "sendto failed"))?;
    trace!(dst = %destination, "echo request sent");

    let mut readiness = watch(&channel)?;
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; RECV_BUFFER_LEN];

    loop {
        let wait = match target.wait_policy() {
            WaitPolicy::PerWait => timeout,
            WaitPolicy::Deadline => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    debug!(dst = %destination, ?timeout, "deadline passed without echo reply");
                    return Err(ProbeError::timeout("epoll_wait timeout"));
                }
                left
            }
        };

        let ready = readiness
            .wait(wait)
            .map_err(|e| ProbeError::system(e, "epoll_wait failed"))?;
        if ready == 0 {
            debug!(dst = %destination, ?wait, "no echo reply");
            return Err(ProbeError::timeout("epoll_wait timeout"));
        }

        let n = match channel.recv_nonblocking(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(dst = %destination, "spurious wakeup");
                continue;
            }
            Err(e) => return Err(ProbeError::system(e, "recv failed")),
        };

        match IcmpMessageView::parse(&buf[..n]) {
            Some(reply) if reply.source == destination && reply.icmp_type == ICMP_ECHO_REPLY => {
                debug!(dst = %destination, "echo reply received");
                return Ok(true);
            }
            other => trace!(dst = %destination, ?other, "unrelated icmp ignored"),
        }
    }
}
