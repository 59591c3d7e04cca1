//! Wire protocol: frame codec and payload sub-formats shared by server and client.
//!
//! Wire format:
//!
//! ```text
//! [role: u8] [action: u8] [payload_length: u32 BE] [payload: payload_length bytes]
//! ```
//!
//! `role`/`action` are single ASCII bytes; together they select a message
//! type (see [`message_type`]). The codec itself is oblivious to which
//! pairs are valid — validation lives in the connection handler.

use std::io::{self, Read, Write};

use crate::error::FrameError;

/// Size of the fixed header: role(1) + action(1) + payload_length(4).
pub const HEADER_LEN: usize = 6;

/// Hard cap on payload size (10 MiB). Declaring more than this is a
/// protocol error, not merely rejected content.
pub const MAX_PAYLOAD: u32 = 10 * 1024 * 1024;

/// `(role, action)` byte pairs, one per message type in §6.
pub mod message_type {
    /// Login request / reply.
    pub const LOGIN: (u8, u8) = (b'L', b'O');
    /// Subscribe request / ack.
    pub const SUBSCRIBE: (u8, u8) = (b'S', b'S');
    /// Unsubscribe request / ack.
    pub const UNSUBSCRIBE: (u8, u8) = (b'S', b'U');
    /// Create-queue request / ack.
    pub const QUEUE_CREATE: (u8, u8) = (b'P', b'C');
    /// Delete-queue request / ack.
    pub const QUEUE_DELETE: (u8, u8) = (b'P', b'D');
    /// Publish request / ack.
    pub const PUBLISH: (u8, u8) = (b'P', b'B');
    /// Heartbeat, both directions.
    pub const HEARTBEAT: (u8, u8) = (b'H', b'B');
    /// Catalog broadcast after create/delete.
    pub const QUEUE_LIST: (u8, u8) = (b'Q', b'L');
    /// Initial catalog sent right after a successful login.
    pub const INITIAL_CATALOG: (u8, u8) = (b'I', b'N');
    /// Multicast of a single published message.
    pub const MULTICAST: (u8, u8) = (b'M', b'S');
    /// Batch replay of retained messages to a new subscriber.
    pub const BATCH: (u8, u8) = (b'M', b'A');
    /// Queue-deleted notice.
    pub const QUEUE_DELETED: (u8, u8) = (b'N', b'D');
}

/// A fully decoded frame: type pair plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type pair.
    pub kind: (u8, u8),
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

/// Encode `(role, action, payload)` into a single wire buffer.
///
/// The payload length is clamped only by the 32-bit field; callers are
/// responsible for respecting [`MAX_PAYLOAD`] before calling this.
pub fn encode(kind: (u8, u8), payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(kind.0);
    buf.push(kind.1);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Read exactly `buf.len()` bytes, looping across short reads.
///
/// A clean EOF (the peer closed the socket) is reported as
/// [`FrameError::Disconnected`]; any other I/O failure is
/// [`FrameError::Network`]. Partial reads are never surfaced to the caller.
pub fn read_exact(stream: &mut impl Read, buf: &mut [u8]) -> Result<(), FrameError> {
    stream.read_exact(buf).map_err(FrameError::from_io)
}

/// Read and decode one frame from `stream`.
///
/// Performs the header read, the `MAX_PAYLOAD` bound check (before any
/// payload allocation or read), then the exact-count payload read.
pub fn read_frame(stream: &mut impl Read) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    read_exact(stream, &mut header)?;
    let kind = (header[0], header[1]);
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    if len > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            kind,
            len,
            max: MAX_PAYLOAD,
        });
    }
    let mut payload = vec![0u8; len as usize];
    read_exact(stream, &mut payload)?;
    Ok(Frame { kind, payload })
}

/// Encode and write a frame, flushing nothing extra beyond the write itself.
pub fn write_frame(stream: &mut impl Write, kind: (u8, u8), payload: &[u8]) -> io::Result<()> {
    stream.write_all(&encode(kind, payload))
}

// ─── Payload sub-formats ────────────────────────────────────────────────────

/// Encode the `PB` (publish) request payload: `name_len(4)|ttl(4)|name|text`.
pub fn encode_publish(name: &[u8], ttl: u32, text: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + name.len() + text.len());
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(&ttl.to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(text);
    buf
}

/// Decode a `PB` payload into `(name, ttl, text)`.
pub fn decode_publish(payload: &[u8]) -> Option<(Vec<u8>, u32, Vec<u8>)> {
    if payload.len() < 8 {
        return None;
    }
    let name_len = u32::from_be_bytes(payload[0..4].try_into().ok()?) as usize;
    let ttl = u32::from_be_bytes(payload[4..8].try_into().ok()?);
    let rest = &payload[8..];
    if rest.len() < name_len {
        return None;
    }
    let name = rest[..name_len].to_vec();
    let text = rest[name_len..].to_vec();
    Some((name, ttl, text))
}

/// Encode a `QL`/`IN` catalog frame: `count(4)|(name_len(4)|name)*`.
pub fn encode_catalog(names: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(names.len() as u32).to_be_bytes());
    for name in names {
        buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
    }
    buf
}

/// Decode a `QL`/`IN` catalog payload into the list of queue names.
pub fn decode_catalog(payload: &[u8]) -> Option<Vec<String>> {
    if payload.len() < 4 {
        return None;
    }
    let count = u32::from_be_bytes(payload[0..4].try_into().ok()?) as usize;
    let mut offset = 4;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        if payload.len() < offset + 4 {
            return None;
        }
        let name_len =
            u32::from_be_bytes(payload[offset..offset + 4].try_into().ok()?) as usize;
        offset += 4;
        if payload.len() < offset + name_len {
            return None;
        }
        let name = String::from_utf8(payload[offset..offset + name_len].to_vec()).ok()?;
        offset += name_len;
        names.push(name);
    }
    Some(names)
}

/// Encode an `MS` multicast payload: `name_len(4)|name|text`.
pub fn encode_multicast(name: &[u8], text: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + name.len() + text.len());
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(text);
    buf
}

/// Decode an `MS` payload into `(name, text)`.
pub fn decode_multicast(payload: &[u8]) -> Option<(String, Vec<u8>)> {
    if payload.len() < 4 {
        return None;
    }
    let name_len = u32::from_be_bytes(payload[0..4].try_into().ok()?) as usize;
    if payload.len() < 4 + name_len {
        return None;
    }
    let name = String::from_utf8(payload[4..4 + name_len].to_vec()).ok()?;
    let text = payload[4 + name_len..].to_vec();
    Some((name, text))
}

/// Encode an `MA` batch-replay payload: `name_len(4)|name|(text_len(4)|text)*`.
pub fn encode_batch(name: &[u8], texts: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name);
    for text in texts {
        buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
        buf.extend_from_slice(text);
    }
    buf
}

/// Decode an `MA` payload into `(name, texts)`.
pub fn decode_batch(payload: &[u8]) -> Option<(String, Vec<Vec<u8>>)> {
    if payload.len() < 4 {
        return None;
    }
    let name_len = u32::from_be_bytes(payload[0..4].try_into().ok()?) as usize;
    if payload.len() < 4 + name_len {
        return None;
    }
    let name = String::from_utf8(payload[4..4 + name_len].to_vec()).ok()?;
    let mut offset = 4 + name_len;
    let mut texts = Vec::new();
    while offset < payload.len() {
        if payload.len() < offset + 4 {
            return None;
        }
        let text_len =
            u32::from_be_bytes(payload[offset..offset + 4].try_into().ok()?) as usize;
        offset += 4;
        if payload.len() < offset + text_len {
            return None;
        }
        texts.push(payload[offset..offset + text_len].to_vec());
        offset += text_len;
    }
    Some((name, texts))
}
