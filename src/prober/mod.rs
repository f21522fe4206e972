use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

pub mod icmp;
pub mod syn;
pub mod tcp_connect;

#[cfg(test)]
pub(crate) mod testing;

/// Check types a runner can schedule against a target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Half-open probe with a crafted SYN on a raw socket.
    Syn,
    /// Full connect, then close with RST.
    Connect,
    /// ICMP echo request.
    Icmp,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Syn => "syn",
            CheckKind::Connect => "connect",
            CheckKind::Icmp => "icmp",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which TCP probe `ProbeTarget::is_ready` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyMode {
    Connect,
    Raw,
}

impl FromStr for ReadyMode {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(ReadyMode::Connect),
            "raw" => Ok(ReadyMode::Raw),
            other => Err(ProbeError::InvalidArgument(format!(
                "invalid type: {other} supports connect or raw"
            ))),
        }
    }
}
