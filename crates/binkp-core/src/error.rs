//! Error types for the BinkP protocol engine.

use std::io;
use thiserror::Error;

/// Frame-level errors (codec boundary).
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload does not fit the 15-bit length field.
    #[error("payload length {0} exceeds the 32767-byte frame limit")]
    Oversize(usize),

    /// Stream ended in the middle of a frame.
    #[error("stream ended mid-frame")]
    Truncated,

    /// Command frame with no command byte.
    #[error("empty command frame")]
    EmptyCommand,

    /// Command byte outside the protocol vocabulary.
    #[error("unknown command id {0}")]
    UnknownCommand(u8),

    /// Command arguments that do not match the command's payload shape.
    #[error("malformed {0} arguments: {1}")]
    BadArguments(&'static str, String),

    /// Underlying transport failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// FTN address and host:port parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input does not have the `zone:net/node[.point][@domain]` shape.
    #[error("not an FTN address: {0:?}")]
    Syntax(String),

    /// A numeric component is missing, non-numeric or exceeds `u16`.
    #[error("address component out of range in {0:?}")]
    Range(String),

    /// Port missing, non-numeric or outside `1..=65535`.
    #[error("invalid port in {0:?}")]
    Port(String),
}

/// Failures reported by an outbound queue implementation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem or database I/O underneath the queue.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// An enumerated item that cannot be served (short file, vanished row).
    #[error("{0}")]
    Item(String),
}

/// Session-fatal errors. Every variant aborts the session; only
/// [`SessionError::is_transient`] ones are worth retrying from the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket read/write failure.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// Malformed frame on the wire.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Well-formed frames in an order the protocol forbids.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Password verification failed on the answering side.
    #[error("bad password")]
    AuthFailed,

    /// Peer sent `M_BSY`; transient across sessions.
    #[error("remote busy: {0}")]
    PeerBusy(String),

    /// Peer sent `M_ERR`.
    #[error("remote error: {0}")]
    PeerError(String),

    /// Inactivity or connect deadline reached.
    #[error("session timed out")]
    Timeout,

    /// Outbound queue failure.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Inbound spool failure.
    #[error("spool error: {0}")]
    Spool(#[source] io::Error),
}

impl SessionError {
    /// True for failures that may succeed when the session is retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Timeout | SessionError::PeerBusy(_) | SessionError::Transport(_)
        )
    }

    /// Text to put into an outgoing `M_ERR` frame, if this error kind is
    /// reported to the peer at all.
    #[must_use]
    pub(crate) fn wire_text(&self) -> Option<String> {
        match self {
            SessionError::AuthFailed => Some("bad password".to_owned()),
            SessionError::Protocol(msg) => Some(msg.clone()),
            SessionError::Frame(e) => Some(format!("frame error: {e}")),
            SessionError::Queue(_) | SessionError::Spool(_) => Some("local error".to_owned()),
            _ => None,
        }
    }
}
