//! Server: accept loop, connection dispatch, background worker lifecycle.

pub mod connection;
pub mod fanout;
pub mod worker;

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use connection::ConnectionContext;
use fanout::SharedSocketMap;

use crate::queue_store::{QueueStore, SharedQueueStore};
use crate::session::{SessionRegistry, SharedSessionRegistry, DEFAULT_GRACE};

/// How often the accept loop polls `running` while the listener is
/// non-blocking (§5 cancellation).
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Owns the shared broker state and runs the accept loop.
pub struct Server {
    listener: TcpListener,
    queues: SharedQueueStore,
    sessions: SharedSessionRegistry,
    socket_map: SharedSocketMap,
    grace: Duration,
    running: Arc<AtomicBool>,
}

impl Server {
    /// Bind a listener on `addr` with the default reconnect grace window.
    pub fn bind(addr: &str, running: Arc<AtomicBool>) -> std::io::Result<Self> {
        Self::bind_with_grace(addr, DEFAULT_GRACE, running)
    }

    /// Bind a listener on `addr` with a custom reconnect grace window
    /// (used by tests that want a short grace to avoid real sleeps).
    pub fn bind_with_grace(
        addr: &str,
        grace: Duration,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            queues: QueueStore::shared(),
            sessions: SessionRegistry::shared(),
            socket_map: fanout::new_socket_map(),
            grace,
            running,
        })
    }

    /// The bound local address (useful when binding to port 0 in tests).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop on the calling thread until `running` is
    /// cleared. Spawns the background worker and one thread per accepted
    /// connection.
    pub fn run(&self) {
        let worker_handle = worker::spawn(
            self.queues.clone(),
            self.sessions.clone(),
            self.socket_map.clone(),
            self.grace,
            Arc::clone(&self.running),
        );

        log::info!(
            "[server] listening on {}",
            self.listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".to_string())
        );

        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    log::info!("[server] accepted connection from {peer}");
                    let ctx = ConnectionContext {
                        queues: self.queues.clone(),
                        sessions: self.sessions.clone(),
                        socket_map: self.socket_map.clone(),
                        grace: self.grace,
                    };
                    thread::spawn(move || connection::handle(stream, &ctx));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    log::warn!("[server] accept failed: {err}");
                }
            }
        }

        log::info!("[server] shutting down, waiting for background worker");
        let _ = worker_handle.join();
    }
}
