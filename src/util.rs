// Argument parsing shared by the target constructors and the config loader.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{ProbeError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

pub fn parse_host_port(s: &str, default_port: u16) -> (String, u16) {
    if let Some(idx) = s.rfind(':') {
        if let Ok(port) = s[idx + 1..].parse::<u16>() {
            return (s[..idx].to_string(), port);
        }
    }
    (s.to_string(), default_port)
}

/// Dotted-quad IPv4 only; hostnames are not resolved.
pub fn parse_ipv4(s: &str, field: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ProbeError::InvalidArgument(format!("{field} is not an IPv4 address: {s:?}")))
}

/// Fractional seconds to a `Duration`. Zero selects [`DEFAULT_TIMEOUT`].
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if secs == 0.0 {
        return Ok(DEFAULT_TIMEOUT);
    }
    if !secs.is_finite() || secs < 0.0 {
        return Err(ProbeError::InvalidArgument(format!(
            "timeout must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ProbeError::InvalidArgument(format!("timeout {secs}: {e}")))
}
