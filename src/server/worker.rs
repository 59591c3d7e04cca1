//! Background worker (C6): periodic TTL eviction, stale-session reaping,
//! heartbeat emission. Runs on a single dedicated thread with a 1-second
//! tick so shutdown latency stays bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::protocol::message_type;
use crate::queue_store::SharedQueueStore;
use crate::server::fanout::{self, SharedSocketMap};
use crate::session::SharedSessionRegistry;
use crate::{HEARTBEAT_INTERVAL, WORKER_TICK};

/// Spawn the background worker thread. It runs until `running` is cleared.
pub fn spawn(
    queues: SharedQueueStore,
    sessions: SharedSessionRegistry,
    socket_map: SharedSocketMap,
    grace: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || run(&queues, &sessions, &socket_map, grace, &running))
}

fn run(
    queues: &SharedQueueStore,
    sessions: &SharedSessionRegistry,
    socket_map: &SharedSocketMap,
    grace: Duration,
    running: &AtomicBool,
) {
    let mut last_sweep = Instant::now();
    log::info!("[worker] background worker started");
    while running.load(Ordering::Relaxed) {
        thread::sleep(WORKER_TICK);
        if !running.load(Ordering::Relaxed) {
            break;
        }
        if last_sweep.elapsed() < HEARTBEAT_INTERVAL {
            continue;
        }
        last_sweep = Instant::now();
        sweep(queues, sessions, socket_map, grace);
    }
    log::info!("[worker] background worker stopped");
}

fn sweep(
    queues: &SharedQueueStore,
    sessions: &SharedSessionRegistry,
    socket_map: &SharedSocketMap,
    grace: Duration,
) {
    let now = Instant::now();

    let (reaped, live_fds) = {
        let mut registry = sessions.lock().unwrap();
        let reaped = registry.reap_expired(grace, now);
        let live_fds = registry.live_fds();
        (reaped, live_fds)
    };

    if !reaped.is_empty() {
        let mut store = queues.lock().unwrap();
        for id in &reaped {
            store.purge_subscriber(id);
        }
        log::info!("[worker] reaped {} expired session(s)", reaped.len());
    }

    for fd in live_fds {
        fanout::send_to(socket_map, fd, message_type::HEARTBEAT, &[]);
    }

    queues.lock().unwrap().evict_expired(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_store::QueueStore;
    use crate::session::{ClientId, SessionRegistry};
    use std::net::{TcpListener, TcpStream};

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn sweep_reaps_and_purges_expired_sessions() {
        let queues = QueueStore::shared();
        let sessions = SessionRegistry::shared();
        let socket_map = fanout::new_socket_map();

        queues.lock().unwrap().create("q");
        let alice = ClientId::new("alice").unwrap();
        let (_c, s) = pair();
        let t0 = Instant::now();
        sessions
            .lock()
            .unwrap()
            .login(alice.clone(), s, Duration::from_secs(30), t0);
        queues.lock().unwrap().subscribe("q", &alice);
        sessions.lock().unwrap().mark_disconnected(&alice, t0);

        // Not yet past grace: sweep must not purge.
        sweep(&queues, &sessions, &socket_map, Duration::from_secs(30));
        assert!(queues.lock().unwrap().get("q").unwrap().subscribers().contains(&alice));

        // Simulate grace elapsed by reaping with a zero grace window.
        sweep(&queues, &sessions, &socket_map, Duration::from_secs(0));
        assert!(!queues.lock().unwrap().get("q").unwrap().subscribers().contains(&alice));
    }
}
