//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
///
/// Every variant is an ordinary value handed back to the caller; none of them
/// tears down the session on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("timeout")]
    Timeout,

    #[error("parse error: {detail}")]
    Parse { detail: String, raw: String },

    /// The device answered with an `error` field; the message is kept verbatim.
    #[error("{0}")]
    Device(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Suspected device crash: {0}")]
    SuspectedCrash(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),
}

impl ProtocolError {
    /// Build a transport error from an I/O failure, tagging which step failed
    pub(crate) fn io(op: &str, err: impl std::fmt::Display) -> Self {
        ProtocolError::Transport(format!("{op}: {err}"))
    }

    /// True for failures of the byte stream itself, as opposed to anything the
    /// device said or failed to say in time.
    pub fn is_communication_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::Transport(_) | ProtocolError::SuspectedCrash(_)
        )
    }

    /// Raw reply text attached to the error, if any
    pub fn raw(&self) -> Option<&str> {
        match self {
            ProtocolError::Parse { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }
}
