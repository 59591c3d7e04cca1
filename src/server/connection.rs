//! Per-connection handler (C4): login handshake, command dispatch,
//! protocol-error policy, teardown.

use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::error::FrameError;
use crate::protocol::{self, message_type, Frame};
use crate::queue_store::{CreateOutcome, SharedQueueStore, SubscribeOutcome, UnsubscribeOutcome};
use crate::server::fanout::{self, SharedSocketMap};
use crate::session::{ClientId, ClientIdError, LoginOutcome, SharedSessionRegistry};
use crate::CLIENT_READ_TIMEOUT;

/// Everything a connection handler needs a handle to.
pub struct ConnectionContext {
    /// Shared queue catalog.
    pub queues: SharedQueueStore,
    /// Shared session registry.
    pub sessions: SharedSessionRegistry,
    /// Shared per-socket send-mutex map.
    pub socket_map: SharedSocketMap,
    /// Reconnect grace window.
    pub grace: Duration,
}

enum ConnState {
    Login,
    Authed { id: ClientId, fd: std::os::fd::RawFd },
}

/// Run the connection handler to completion on the calling thread. Intended
/// to be invoked as the body of a per-connection spawned thread.
pub fn handle(mut stream: TcpStream, ctx: &ConnectionContext) {
    if let Err(err) = stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT)) {
        log::warn!("[conn] failed to set read timeout: {err}");
    }

    let mut state = ConnState::Login;

    loop {
        let frame = match protocol::read_frame(&mut stream) {
            Ok(frame) => frame,
            Err(err) => {
                handle_frame_error(&mut stream, &state, &err);
                break;
            }
        };

        match &state {
            ConnState::Login => {
                if frame.kind != message_type::LOGIN {
                    reply(&mut stream, message_type::LOGIN, "ER:FIRST YOU MUST LOG IN");
                    continue;
                }
                match attempt_login(&mut stream, ctx, &frame) {
                    Some((id, fd)) => state = ConnState::Authed { id, fd },
                    None => continue,
                }
            }
            ConnState::Authed { id, fd } => {
                if frame.kind == message_type::LOGIN {
                    reply(&mut stream, message_type::LOGIN, "ER:USER_ID_ALREADY_GIVEN");
                    continue;
                }
                dispatch(ctx, id, *fd, &frame);
            }
        }
    }

    teardown(ctx, &state);
}

fn handle_frame_error(stream: &mut TcpStream, _state: &ConnState, err: &FrameError) {
    match err {
        FrameError::Disconnected => {
            log::info!("[conn] peer disconnected");
        }
        FrameError::Network(io_err) => {
            log::warn!("[conn] network error: {io_err}");
        }
        FrameError::PayloadTooLarge { kind, len, max } => {
            log::warn!("[conn] payload too large: {len} > {max}");
            reply(stream, *kind, "ER:MSG_TOO_BIG");
        }
    }
}

/// Attempt to log in on `frame`. Returns the new authenticated identity and
/// its fd on success; replies and returns `None` on any rejection.
fn attempt_login(
    stream: &mut TcpStream,
    ctx: &ConnectionContext,
    frame: &Frame,
) -> Option<(ClientId, std::os::fd::RawFd)> {
    let raw_id = String::from_utf8_lossy(&frame.payload).into_owned();
    let id = match ClientId::new(&raw_id) {
        Ok(id) => id,
        Err(ClientIdError::TooShort) => {
            reply(stream, message_type::LOGIN, "ER:ID_TOO_SHORT");
            return None;
        }
        Err(ClientIdError::TooLong) => {
            reply(stream, message_type::LOGIN, "ER:ID_TOO_LONG");
            return None;
        }
    };

    let for_registry = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            log::warn!("[conn] failed to clone socket for registry: {err}");
            return None;
        }
    };
    let for_sending = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            log::warn!("[conn] failed to clone socket for sending: {err}");
            return None;
        }
    };
    let fd = for_registry.as_raw_fd();

    let now = Instant::now();
    let outcome = ctx
        .sessions
        .lock()
        .unwrap()
        .login(id.clone(), for_registry, ctx.grace, now);

    match outcome {
        LoginOutcome::IdTaken => {
            reply(stream, message_type::LOGIN, "ER:ID_TAKEN");
            None
        }
        LoginOutcome::Logged => {
            fanout::register(&ctx.socket_map, fd, for_sending);
            reply(stream, message_type::LOGIN, "OK:LOGGED");
            send_initial_catalog(ctx, fd);
            Some((id, fd))
        }
        LoginOutcome::Reconnected => {
            fanout::register(&ctx.socket_map, fd, for_sending);
            reply(stream, message_type::LOGIN, "OK:RECONNECTED");
            send_initial_catalog(ctx, fd);
            Some((id, fd))
        }
        LoginOutcome::ReconnectedAfterGrace => {
            ctx.queues.lock().unwrap().purge_subscriber(&id);
            fanout::register(&ctx.socket_map, fd, for_sending);
            reply(stream, message_type::LOGIN, "OK:LOGGED");
            send_initial_catalog(ctx, fd);
            Some((id, fd))
        }
    }
}

fn send_initial_catalog(ctx: &ConnectionContext, fd: std::os::fd::RawFd) {
    let names = ctx.queues.lock().unwrap().snapshot();
    let payload = protocol::encode_catalog(&names);
    fanout::send_to(&ctx.socket_map, fd, message_type::INITIAL_CATALOG, &payload);
}

fn dispatch(ctx: &ConnectionContext, id: &ClientId, fd: std::os::fd::RawFd, frame: &Frame) {
    match frame.kind {
        message_type::HEARTBEAT => {
            // Liveness only; the read itself already reset the timeout.
        }
        message_type::SUBSCRIBE => handle_subscribe(ctx, id, fd, frame),
        message_type::UNSUBSCRIBE => handle_unsubscribe(ctx, id, fd, frame),
        message_type::QUEUE_CREATE => handle_queue_create(ctx, fd, frame),
        message_type::QUEUE_DELETE => handle_queue_delete(ctx, fd, frame),
        message_type::PUBLISH => handle_publish(ctx, fd, frame),
        _ => {
            log::debug!(
                "[conn] unknown message type in AUTHED state: {:?}",
                frame.kind
            );
        }
    }
}

fn handle_subscribe(ctx: &ConnectionContext, id: &ClientId, fd: std::os::fd::RawFd, frame: &Frame) {
    let name = String::from_utf8_lossy(&frame.payload).into_owned();
    let outcome = ctx.queues.lock().unwrap().subscribe(&name, id);
    match outcome {
        SubscribeOutcome::Subscribed => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::SUBSCRIBE, "OK");
            let retained = ctx
                .queues
                .lock()
                .unwrap()
                .drain_retained(&name, Instant::now())
                .unwrap_or_default();
            fanout::replay_retained(&ctx.socket_map, fd, &name, &retained);
        }
        SubscribeOutcome::AlreadySubscribed => {
            fanout::unicast_reply(
                &ctx.socket_map,
                fd,
                message_type::SUBSCRIBE,
                "ER:ALREADY_SUBSCRIBED",
            );
        }
        SubscribeOutcome::NotFound => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::SUBSCRIBE, "ER:NO_QUEUE");
        }
    }
}

fn handle_unsubscribe(ctx: &ConnectionContext, id: &ClientId, fd: std::os::fd::RawFd, frame: &Frame) {
    let name = String::from_utf8_lossy(&frame.payload).into_owned();
    let outcome = ctx.queues.lock().unwrap().unsubscribe(&name, id);
    let status = match outcome {
        UnsubscribeOutcome::Unsubscribed => "OK",
        UnsubscribeOutcome::NotSubscribed => "ER:NOT_SUBSCRIBING",
        UnsubscribeOutcome::NotFound => "ER:NO_QUEUE",
    };
    fanout::unicast_reply(&ctx.socket_map, fd, message_type::UNSUBSCRIBE, status);
}

fn handle_queue_create(ctx: &ConnectionContext, fd: std::os::fd::RawFd, frame: &Frame) {
    let name = String::from_utf8_lossy(&frame.payload).into_owned();
    let outcome = ctx.queues.lock().unwrap().create(&name);
    match outcome {
        CreateOutcome::Created => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::QUEUE_CREATE, "OK");
            broadcast_catalog(ctx);
        }
        CreateOutcome::AlreadyExists => {
            fanout::unicast_reply(
                &ctx.socket_map,
                fd,
                message_type::QUEUE_CREATE,
                "ER:QUEUE_EXISTS",
            );
        }
    }
}

fn handle_queue_delete(ctx: &ConnectionContext, fd: std::os::fd::RawFd, frame: &Frame) {
    let name = String::from_utf8_lossy(&frame.payload).into_owned();
    let deleted = ctx.queues.lock().unwrap().delete(&name);
    match deleted {
        Some(subscriber_ids) => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::QUEUE_DELETE, "OK");
            fanout::deletion_notice(&ctx.sessions, &ctx.socket_map, &name, &subscriber_ids);
            broadcast_catalog(ctx);
        }
        None => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::QUEUE_DELETE, "ER:NO_QUEUE");
        }
    }
}

fn handle_publish(ctx: &ConnectionContext, fd: std::os::fd::RawFd, frame: &Frame) {
    let Some((name_bytes, ttl, text)) = protocol::decode_publish(&frame.payload) else {
        fanout::unicast_reply(&ctx.socket_map, fd, message_type::PUBLISH, "ER:MALFORMED");
        return;
    };
    let name = String::from_utf8_lossy(&name_bytes).into_owned();
    if !(crate::MIN_TTL_SECS..=crate::MAX_TTL_SECS).contains(&ttl) {
        fanout::unicast_reply(&ctx.socket_map, fd, message_type::PUBLISH, "ER:BAD_TTL");
        return;
    }
    let subscribers = ctx
        .queues
        .lock()
        .unwrap()
        .publish(&name, text.clone(), ttl, Instant::now());
    match subscribers {
        Some(subscriber_ids) => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::PUBLISH, "OK");
            fanout::multicast_publish(&ctx.sessions, &ctx.socket_map, &name, &subscriber_ids, &text);
        }
        None => {
            fanout::unicast_reply(&ctx.socket_map, fd, message_type::PUBLISH, "ER:NO_QUEUE");
        }
    }
}

fn broadcast_catalog(ctx: &ConnectionContext) {
    let names = ctx.queues.lock().unwrap().snapshot();
    fanout::broadcast_catalog(&ctx.sessions, &ctx.socket_map, &names);
}

fn reply(stream: &mut TcpStream, kind: (u8, u8), status: &str) {
    if let Err(err) = protocol::write_frame(stream, kind, status.as_bytes()) {
        log::debug!("[conn] reply send failed: {err}");
    }
}

fn teardown(ctx: &ConnectionContext, state: &ConnState) {
    if let ConnState::Authed { id, fd } = state {
        ctx.sessions
            .lock()
            .unwrap()
            .mark_disconnected(id, Instant::now());
        fanout::unregister(&ctx.socket_map, *fd);
        log::info!("[conn] session for {id} torn down");
    }
}
