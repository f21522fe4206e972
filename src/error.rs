use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An OS call failed. `context` names the call (e.g. "recvfrom failed").
    #[error("sys failed. errno: {errno} message: {message} context: {context}")]
    System {
        errno: i32,
        message: String,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, ProbeError>;

impl ProbeError {
    pub fn system(err: io::Error, context: impl Into<String>) -> Self {
        ProbeError::System {
            errno: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
            context: context.into(),
        }
    }

    /// A wait that elapsed with nothing to read. Carries ETIMEDOUT so callers
    /// matching on errno see the same code a timed-out socket call reports.
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::system(io::Error::from_raw_os_error(libc::ETIMEDOUT), context)
    }

    pub fn errno(&self) -> Option<i32> {
        match self {
            ProbeError::System { errno, .. } => Some(*errno),
            ProbeError::InvalidArgument(_) => None,
        }
    }

    /// True for ETIMEDOUT and for EAGAIN, which is what a socket-level
    /// receive timeout surfaces as on Linux.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.errno(),
            Some(libc::ETIMEDOUT) | Some(libc::EAGAIN)
        )
    }
}
