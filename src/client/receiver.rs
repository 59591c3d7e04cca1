//! Background receiver thread (C7): decodes frames off the wire and turns
//! them into [`Event`]s, the dispatch table mirrored from §4.7.

use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use crate::protocol::{self, message_type};

use super::events::{Event, EventQueue};

/// Spawn the receiver thread. Runs until the connection ends, then pushes a
/// final `Event::Disconnected` and returns.
///
/// `writer` is the same mutex-guarded stream [`super::Client`] sends
/// commands through: the `HB` auto-reply shares it so the heartbeat reply
/// never interleaves with an in-flight command write.
///
/// `queues_cache` is replaced wholesale on every `IN`/`QL` frame before the
/// matching `QueueList` event is pushed, so [`super::Client::available_queues`]
/// never lags behind an event a caller has already drained.
pub fn spawn(
    mut reader: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    events: Arc<EventQueue>,
    queues_cache: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || run(&mut reader, &writer, &events, &queues_cache))
}

fn run(
    reader: &mut TcpStream,
    writer: &Mutex<TcpStream>,
    events: &EventQueue,
    queues_cache: &Mutex<Vec<String>>,
) {
    loop {
        match protocol::read_frame(reader) {
            Ok(frame) if frame.kind == message_type::HEARTBEAT => {
                let mut stream = writer.lock().unwrap();
                if let Err(err) = protocol::write_frame(&mut *stream, message_type::HEARTBEAT, &[]) {
                    log::debug!("[client] heartbeat reply failed: {err}");
                }
            }
            Ok(frame)
                if frame.kind == message_type::INITIAL_CATALOG
                    || frame.kind == message_type::QUEUE_LIST =>
            {
                match protocol::decode_catalog(&frame.payload) {
                    Some(names) => {
                        *queues_cache.lock().unwrap() = names.clone();
                        events.push(Event::QueueList(names));
                    }
                    None => events.push(Event::Error("ER:MALFORMED_CATALOG".to_string())),
                }
            }
            Ok(frame) => events.push(decode(frame)),
            Err(err) => {
                log::info!("[client] receiver stopping: {err}");
                events.push(Event::Disconnected(err.to_string()));
                return;
            }
        }
    }
}

fn decode(frame: protocol::Frame) -> Event {
    match frame.kind {
        message_type::INITIAL_CATALOG | message_type::QUEUE_LIST => {
            match protocol::decode_catalog(&frame.payload) {
                Some(names) => Event::QueueList(names),
                None => Event::Error("ER:MALFORMED_CATALOG".to_string()),
            }
        }
        message_type::MULTICAST => match protocol::decode_multicast(&frame.payload) {
            Some((source, text)) => Event::Message { source, text },
            None => Event::Error("ER:MALFORMED_MULTICAST".to_string()),
        },
        message_type::BATCH => match protocol::decode_batch(&frame.payload) {
            Some((source, items)) => Event::BatchMessages { source, items },
            None => Event::Error("ER:MALFORMED_BATCH".to_string()),
        },
        message_type::QUEUE_DELETED => {
            let name = String::from_utf8_lossy(&frame.payload).into_owned();
            Event::QueueDeleted(name)
        }
        message_type::SUBSCRIBE
        | message_type::UNSUBSCRIBE
        | message_type::QUEUE_CREATE
        | message_type::QUEUE_DELETE
        | message_type::PUBLISH
        | message_type::LOGIN => {
            let status = String::from_utf8_lossy(&frame.payload).into_owned();
            if status.starts_with("ER:") {
                Event::Error(status)
            } else {
                Event::StatusUpdate(status)
            }
        }
        (role, action) => {
            log::debug!("[client] unknown message type {role}/{action}");
            Event::Error(format!("ER:UNKNOWN_TYPE {role}/{action}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_multicast_frame() {
        let payload = protocol::encode_multicast(b"jobs", b"hi");
        let frame = protocol::Frame {
            kind: message_type::MULTICAST,
            payload,
        };
        assert_eq!(
            decode(frame),
            Event::Message {
                source: "jobs".to_string(),
                text: b"hi".to_vec(),
            }
        );
    }

    #[test]
    fn decodes_error_status_as_error_event() {
        let frame = protocol::Frame {
            kind: message_type::SUBSCRIBE,
            payload: b"ER:NO_QUEUE".to_vec(),
        };
        assert_eq!(decode(frame), Event::Error("ER:NO_QUEUE".to_string()));
    }

    #[test]
    fn decodes_ok_status_as_status_update() {
        let frame = protocol::Frame {
            kind: message_type::SUBSCRIBE,
            payload: b"OK".to_vec(),
        };
        assert_eq!(decode(frame), Event::StatusUpdate("OK".to_string()));
    }

    #[test]
    fn decodes_queue_deleted_notice() {
        let frame = protocol::Frame {
            kind: message_type::QUEUE_DELETED,
            payload: b"jobs".to_vec(),
        };
        assert_eq!(decode(frame), Event::QueueDeleted("jobs".to_string()));
    }
}
