//! Session registry (C3): login identity → session record, with
//! grace-period reconnection.

use std::collections::HashMap;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default grace window for reconnect-with-identity-preserved (§4.3).
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Minimum accepted client-id length.
pub const MIN_CLIENT_ID_LEN: usize = 2;
/// Maximum accepted client-id length (§9 decision: matches queue-name bound).
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Opaque client identity. Acts as both authentication and identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

/// Why a candidate client id was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    /// Shorter than [`MIN_CLIENT_ID_LEN`].
    TooShort,
    /// Longer than [`MAX_CLIENT_ID_LEN`].
    TooLong,
}

impl ClientId {
    /// Validate and wrap a candidate client id.
    pub fn new(raw: &str) -> Result<Self, ClientIdError> {
        if raw.len() < MIN_CLIENT_ID_LEN {
            return Err(ClientIdError::TooShort);
        }
        if raw.len() > MAX_CLIENT_ID_LEN {
            return Err(ClientIdError::TooLong);
        }
        Ok(ClientId(raw.to_string()))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side record of a logged-in client.
pub struct Session {
    id: ClientId,
    socket: Option<TcpStream>,
    disconnected_at: Option<Instant>,
}

impl Session {
    /// The client id this session belongs to.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// True while the session has a live socket.
    pub fn is_live(&self) -> bool {
        self.socket.is_some()
    }

    /// Raw fd of the live socket, used as the per-socket send-mutex key.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|s| s.as_raw_fd())
    }
}

/// Outcome of a login attempt against the registry.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Fresh session created.
    Logged,
    /// An existing, disconnected session was resumed within its grace
    /// window; subscriptions are preserved.
    Reconnected,
    /// An existing, disconnected session was resumed after its grace
    /// window elapsed; the caller must purge this id from every queue
    /// before subscriptions are considered valid again.
    ReconnectedAfterGrace,
    /// A session with a live socket already exists for this id.
    IdTaken,
}

/// Shared, lock-guarded handle to the registry.
pub type SharedSessionRegistry = Arc<Mutex<SessionRegistry>>;

/// The session registry: one entry per `ClientId`, keyed by identity.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<ClientId, Session>,
}

impl SessionRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh registry in the shared, lock-guarded handle.
    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Attempt to log `id` in on `socket`, applying the grace-window rule.
    /// On `IdTaken`, the caller must not admit the connection; `socket` is
    /// returned so it can be dropped by the caller without ambiguity.
    pub fn login(
        &mut self,
        id: ClientId,
        socket: TcpStream,
        grace: Duration,
        now: Instant,
    ) -> LoginOutcome {
        match self.sessions.get_mut(&id) {
            None => {
                self.sessions.insert(
                    id.clone(),
                    Session {
                        id,
                        socket: Some(socket),
                        disconnected_at: None,
                    },
                );
                LoginOutcome::Logged
            }
            Some(existing) if existing.is_live() => LoginOutcome::IdTaken,
            Some(existing) => {
                let disconnected_at = existing.disconnected_at.unwrap_or(now);
                let within_grace = now.saturating_duration_since(disconnected_at) < grace;
                existing.socket = Some(socket);
                existing.disconnected_at = None;
                if within_grace {
                    LoginOutcome::Reconnected
                } else {
                    LoginOutcome::ReconnectedAfterGrace
                }
            }
        }
    }

    /// Mark `id` disconnected: drop the socket, stamp the time. The
    /// session itself is not erased; the background worker reaps it once
    /// its grace window elapses.
    pub fn mark_disconnected(&mut self, id: &ClientId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.socket = None;
            session.disconnected_at = Some(now);
        }
    }

    /// Raw fds of every live session, for heartbeats and catalog broadcasts.
    ///
    /// These fds are the identities registered in the fan-out socket map
    /// (§5); they are not used for I/O directly.
    pub fn live_fds(&self) -> Vec<RawFd> {
        self.sessions.values().filter_map(Session::raw_fd).collect()
    }

    /// Raw fd of a single id's live socket, if any.
    pub fn fd_for(&self, id: &ClientId) -> Option<RawFd> {
        self.sessions.get(id).and_then(Session::raw_fd)
    }

    /// Reap every session that has been disconnected for at least `grace`,
    /// returning the ids that must be purged from the queue store.
    pub fn reap_expired(&mut self, grace: Duration, now: Instant) -> Vec<ClientId> {
        let mut reaped = Vec::new();
        self.sessions.retain(|id, session| {
            if !session.is_live() {
                let elapsed = session
                    .disconnected_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or_default();
                if elapsed >= grace {
                    reaped.push(id.clone());
                    return false;
                }
            }
            true
        });
        reaped
    }

    /// Whether `id` currently has a session (live or within grace).
    pub fn contains(&self, id: &ClientId) -> bool {
        self.sessions.contains_key(id)
    }
}
