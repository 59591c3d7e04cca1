//! Typed error enums for the library boundary.
//!
//! Binaries (`src/bin/*.rs`) collapse these into `anyhow::Error` at the
//! process boundary; internal component boundaries keep the typed variants
//! so callers can match on the distinction the spec draws between
//! disconnect / network-error / protocol-error.

use std::io;

/// Failure reading or writing a frame on a connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the connection (clean EOF on a boundary read).
    #[error("connection closed by peer")]
    Disconnected,

    /// Any I/O failure other than a clean close.
    #[error("network error: {0}")]
    Network(#[source] io::Error),

    /// The declared payload length exceeds `MAX_PAYLOAD`.
    #[error("declared payload length {len} exceeds the {max}-byte limit")]
    PayloadTooLarge {
        /// The frame's type pair, so the caller can reply with `<TYPE> ER:MSG_TOO_BIG`.
        kind: (u8, u8),
        /// The declared payload length.
        len: u32,
        /// The configured limit.
        max: u32,
    },
}

impl FrameError {
    /// Classify a raw I/O error the way the exact-read helper requires:
    /// unexpected EOF means the peer hung up cleanly, anything else is a
    /// genuine network fault.
    pub fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Disconnected
        } else {
            FrameError::Network(err)
        }
    }
}

/// Outcome of a client-side precheck, performed before a frame is sent.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    /// Not connected / not logged in yet.
    #[error("not connected")]
    NotConnected,

    /// Client id fails the length or character-class rule.
    #[error("invalid client id: {0}")]
    InvalidClientId(&'static str),

    /// Queue name fails the length or character-class rule.
    #[error("invalid queue name: {0}")]
    InvalidQueueName(&'static str),

    /// TTL outside `[1, 3600]`.
    #[error("ttl {0} out of range 1..=3600")]
    InvalidTtl(u32),
}
