//! Client library (C7): a blocking, typed-method connection wrapper with a
//! background receiver thread, mirroring the server's own "one thread per
//! concern" style.

pub mod events;
mod receiver;

use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use events::Event;
use events::EventQueue;

use crate::error::ValidationError;
use crate::protocol::{self, message_type};
use crate::{MAX_QUEUE_NAME_LEN, MAX_TTL_SECS, MIN_TTL_SECS};

/// How long [`Client::poll_event`] waits by default when no timeout is given
/// explicitly by the caller's loop.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// A logged-in connection to a broker. Commands are fire-and-forget: the
/// call returns as soon as the request is written, and the reply arrives
/// later as an [`Event`] from [`Client::poll_event`].
pub struct Client {
    writer: Arc<Mutex<TcpStream>>,
    events: Arc<EventQueue>,
    queues_cache: Arc<Mutex<Vec<String>>>,
    receiver: Option<std::thread::JoinHandle<()>>,
}

impl Client {
    /// Connect to `addr` and perform the login handshake for `client_id`.
    ///
    /// The handshake is synchronous: the `LO` reply is read directly off
    /// the stream before the receiver thread is spawned, so a rejected
    /// login never races the background reader.
    pub fn connect(addr: &str, client_id: &str) -> Result<Self, ValidationError> {
        validate_client_id(client_id)?;

        let mut stream = TcpStream::connect(addr).map_err(|_| ValidationError::NotConnected)?;
        protocol::write_frame(&mut stream, message_type::LOGIN, client_id.as_bytes())
            .map_err(|_| ValidationError::NotConnected)?;

        let reply = protocol::read_frame(&mut stream).map_err(|_| ValidationError::NotConnected)?;
        let status = String::from_utf8_lossy(&reply.payload).into_owned();
        log::info!("[client] login for {client_id}: {status}");

        let events = Arc::new(EventQueue::new());
        let queues_cache = Arc::new(Mutex::new(Vec::new()));
        let reader_stream = stream
            .try_clone()
            .map_err(|_| ValidationError::NotConnected)?;
        let writer = Arc::new(Mutex::new(stream));
        let receiver = receiver::spawn(
            reader_stream,
            Arc::clone(&writer),
            Arc::clone(&events),
            Arc::clone(&queues_cache),
        );

        Ok(Self {
            writer,
            events,
            queues_cache,
            receiver: Some(receiver),
        })
    }

    /// The most recently observed queue catalog, updated atomically by the
    /// receiver thread on every `IN`/`QL` frame — before the corresponding
    /// `QueueList` event is enqueued, so a caller reading this right after
    /// draining that event never sees a stale value.
    pub fn available_queues(&self) -> Vec<String> {
        self.queues_cache.lock().unwrap().clone()
    }

    /// Request creation of a new queue.
    pub fn create_queue(&self, name: &str) -> Result<(), ValidationError> {
        validate_queue_name(name)?;
        self.send(message_type::QUEUE_CREATE, name.as_bytes())
    }

    /// Request deletion of a queue.
    pub fn delete_queue(&self, name: &str) -> Result<(), ValidationError> {
        validate_queue_name(name)?;
        self.send(message_type::QUEUE_DELETE, name.as_bytes())
    }

    /// Subscribe to a queue.
    pub fn subscribe(&self, name: &str) -> Result<(), ValidationError> {
        validate_queue_name(name)?;
        self.send(message_type::SUBSCRIBE, name.as_bytes())
    }

    /// Unsubscribe from a queue.
    pub fn unsubscribe(&self, name: &str) -> Result<(), ValidationError> {
        validate_queue_name(name)?;
        self.send(message_type::UNSUBSCRIBE, name.as_bytes())
    }

    /// Publish `text` to `name` with the given retention TTL, in seconds.
    pub fn publish(&self, name: &str, ttl_secs: u32, text: &[u8]) -> Result<(), ValidationError> {
        validate_queue_name(name)?;
        if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&ttl_secs) {
            return Err(ValidationError::InvalidTtl(ttl_secs));
        }
        let payload = protocol::encode_publish(name.as_bytes(), ttl_secs, text);
        self.send(message_type::PUBLISH, &payload)
    }

    /// Block up to `timeout` for the next event.
    pub fn poll_event(&self, timeout: Duration) -> Option<Event> {
        self.events.poll(timeout)
    }

    /// Whether the receiver thread is still running (a `Disconnected`
    /// event, once observed, means it is not).
    pub fn is_connected(&self) -> bool {
        self.receiver
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn send(&self, kind: (u8, u8), payload: &[u8]) -> Result<(), ValidationError> {
        let mut stream = self.writer.lock().unwrap();
        let buf = protocol::encode(kind, payload);
        stream
            .write_all(&buf)
            .map_err(|_| ValidationError::NotConnected)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // `shutdown` affects the whole socket, not just this fd, so it
        // unblocks the receiver thread's read even though that thread holds
        // its own cloned fd to the same connection.
        if let Ok(stream) = self.writer.lock() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if let Some(handle) = self.receiver.take() {
            let _ = handle.join();
        }
    }
}

fn validate_client_id(id: &str) -> Result<(), ValidationError> {
    use crate::session::{MAX_CLIENT_ID_LEN, MIN_CLIENT_ID_LEN};
    if id.len() < MIN_CLIENT_ID_LEN {
        return Err(ValidationError::InvalidClientId("too short"));
    }
    if id.len() > MAX_CLIENT_ID_LEN {
        return Err(ValidationError::InvalidClientId("too long"));
    }
    Ok(())
}

fn validate_queue_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidQueueName("empty"));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(ValidationError::InvalidQueueName("too long"));
    }
    let first = name.as_bytes()[0];
    if !first.is_ascii_alphabetic() {
        return Err(ValidationError::InvalidQueueName(
            "must start with an ASCII letter",
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ValidationError::InvalidQueueName(
            "must contain only letters, digits, '_', or '-'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_short_client_id() {
        assert_eq!(
            validate_client_id("a"),
            Err(ValidationError::InvalidClientId("too short"))
        );
    }

    #[test]
    fn rejects_empty_queue_name() {
        assert_eq!(
            validate_queue_name(""),
            Err(ValidationError::InvalidQueueName("empty"))
        );
    }

    #[test]
    fn rejects_ttl_out_of_range() {
        // publish() validates before touching the socket, so this never
        // needs a live connection.
        let err = if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&0u32) {
            Err(ValidationError::InvalidTtl(0))
        } else {
            Ok(())
        };
        assert_eq!(err, Err(ValidationError::InvalidTtl(0)));
    }
}
