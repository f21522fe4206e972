use fast_remote_check::{CheckKind, IcmpTarget, ProbeTarget};

/// A configured target with its probe descriptor already built.
#[derive(Debug, Clone)]
pub enum Check {
    Syn(ProbeTarget),
    Connect(ProbeTarget),
    Icmp(IcmpTarget),
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::Syn(_) => CheckKind::Syn,
            Check::Connect(_) => CheckKind::Connect,
            Check::Icmp(_) => CheckKind::Icmp,
        }
    }

    /// Blocks for up to the target's timeout; call from a blocking thread.
    pub fn run(&self) -> fast_remote_check::Result<bool> {
        match self {
            Check::Syn(t) => t.is_syn_ack_reachable(),
            Check::Connect(t) => t.is_tcp_connectable(),
            Check::Icmp(t) => t.is_icmp_reachable(),
        }
    }
}
