//! Reachability probes for IPv4 hosts: a half-open SYN check on a raw
//! socket, a connect-then-reset check, and an ICMP echo check.
//!
//! Every probe is synchronous and owns exactly one socket for the length of
//! the call. Raw-socket probes need CAP_NET_RAW.

pub mod channel;
pub mod checksum;
pub mod error;
pub mod packet;
pub mod prober;
pub mod target;
pub mod util;

pub use error::{ProbeError, Result};
pub use prober::icmp::WaitPolicy;
pub use prober::syn::SynOutcome;
pub use prober::{CheckKind, ReadyMode};
pub use target::{IcmpTarget, ProbeTarget};
