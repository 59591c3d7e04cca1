//! Fan-out / notification (C5): per-socket send serialization, multicast,
//! catalog broadcast, replay, and deletion notices.
//!
//! Every send here happens with *no* queue or clients lock held: callers
//! collect subscriber ids or sockets under the relevant lock, release it,
//! then call into this module.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::TcpStream;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};

use crate::protocol::{self, message_type};
use crate::session::{ClientId, SharedSessionRegistry};

/// `fd → per-socket send mutex`, guarded by a separate map-lock. Entries
/// are inserted lazily on first send and erased on teardown.
pub type SharedSocketMap = Arc<Mutex<HashMap<RawFd, Arc<Mutex<TcpStream>>>>>;

/// Construct an empty, shared socket map.
pub fn new_socket_map() -> SharedSocketMap {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Register `socket` under `fd` in the send map, replacing any stale entry.
pub fn register(map: &SharedSocketMap, fd: RawFd, socket: TcpStream) {
    map.lock().unwrap().insert(fd, Arc::new(Mutex::new(socket)));
}

/// Remove `fd`'s entry from the send map (called during teardown).
pub fn unregister(map: &SharedSocketMap, fd: RawFd) {
    map.lock().unwrap().remove(&fd);
}

/// Send one frame to `fd`, serialized against any concurrent sender to the
/// same socket. Pipe/reset/bad-fd failures are swallowed at debug level;
/// anything else is logged as a warning. Silently does nothing if `fd` has
/// no registered entry (the peer already disconnected).
pub fn send_to(map: &SharedSocketMap, fd: RawFd, kind: (u8, u8), payload: &[u8]) {
    let handle = map.lock().unwrap().get(&fd).cloned();
    let Some(handle) = handle else {
        return;
    };
    let mut stream = handle.lock().unwrap();
    if let Err(err) = protocol::write_frame(&mut *stream, kind, payload) {
        log_send_failure(fd, &err);
    }
}

fn log_send_failure(fd: RawFd, err: &io::Error) {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected => {
            log::debug!("[fanout] send to fd {fd} failed: {err}");
        }
        _ => log::warn!("[fanout] send to fd {fd} failed: {err}"),
    }
}

/// Unicast a reply of the same type as the originating command.
pub fn unicast_reply(map: &SharedSocketMap, fd: RawFd, kind: (u8, u8), status: &str) {
    send_to(map, fd, kind, status.as_bytes());
}

/// Multicast a published message to every subscriber id that still has a
/// live socket. Subscribers that have since disconnected are skipped
/// silently — no error, no retry.
pub fn multicast_publish(
    sessions: &SharedSessionRegistry,
    map: &SharedSocketMap,
    queue_name: &str,
    subscriber_ids: &[ClientId],
    text: &[u8],
) {
    let payload = protocol::encode_multicast(queue_name.as_bytes(), text);
    let fds = resolve_fds(sessions, subscriber_ids);
    for fd in fds {
        send_to(map, fd, message_type::MULTICAST, &payload);
    }
}

/// Send `ND` to every subscriber that existed at delete time.
pub fn deletion_notice(
    sessions: &SharedSessionRegistry,
    map: &SharedSocketMap,
    queue_name: &str,
    subscriber_ids: &[ClientId],
) {
    let fds = resolve_fds(sessions, subscriber_ids);
    for fd in fds {
        send_to(map, fd, message_type::QUEUE_DELETED, queue_name.as_bytes());
    }
}

/// Broadcast the current catalog to every live session.
pub fn broadcast_catalog(sessions: &SharedSessionRegistry, map: &SharedSocketMap, names: &[String]) {
    let payload = protocol::encode_catalog(names);
    let fds = sessions.lock().unwrap().live_fds();
    for fd in fds {
        send_to(map, fd, message_type::QUEUE_LIST, &payload);
    }
}

/// Replay retained messages for a single subscriber after a successful
/// subscribe, as one `MA` batch frame. No-op if there is nothing retained.
pub fn replay_retained(map: &SharedSocketMap, fd: RawFd, queue_name: &str, texts: &[Vec<u8>]) {
    if texts.is_empty() {
        return;
    }
    let payload = protocol::encode_batch(queue_name.as_bytes(), texts);
    send_to(map, fd, message_type::BATCH, &payload);
}

fn resolve_fds(sessions: &SharedSessionRegistry, ids: &[ClientId]) -> Vec<RawFd> {
    let registry = sessions.lock().unwrap();
    ids.iter().filter_map(|id| registry.fd_for(id)).collect()
}
