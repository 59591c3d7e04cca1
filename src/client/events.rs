//! Client event types and the bounded polling queue (C7).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One decoded, application-facing event. Exactly one variant is produced
/// per incoming frame (§9: tagged enum, not a single record with optional
/// fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Full queue catalog, from an `IN` (post-login) or `QL` (broadcast) frame.
    QueueList(Vec<String>),
    /// A single published message delivered via multicast (`MS`).
    Message {
        /// Name of the source queue.
        source: String,
        /// Message bytes.
        text: Vec<u8>,
    },
    /// Retained messages replayed to a new subscriber (`MA`).
    BatchMessages {
        /// Name of the source queue.
        source: String,
        /// Messages in publish order.
        items: Vec<Vec<u8>>,
    },
    /// A non-error status acknowledgement for a prior command.
    StatusUpdate(String),
    /// A server-reported `ER:<reason>` on a type-matched reply, or a
    /// malformed/unknown frame.
    Error(String),
    /// The subscribed-to queue named here was deleted server-side (`ND`).
    QueueDeleted(String),
    /// The connection ended; no further events will follow.
    Disconnected(String),
}

/// Maximum number of buffered events before the oldest is evicted to admit
/// the newest (§9 decision).
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Bounded FIFO of events, guarded by a mutex/condvar pair so `poll_event`
/// can block up to a short timeout without spinning.
pub struct EventQueue {
    inner: Mutex<VecDeque<Event>>,
    ready: Condvar,
}

impl EventQueue {
    /// Construct an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Push an event, evicting the oldest if the queue is at capacity.
    pub fn push(&self, event: Event) {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= EVENT_QUEUE_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(event);
        self.ready.notify_one();
    }

    /// Block up to `timeout` for the next event, returning `None` if none
    /// arrives in time.
    pub fn poll(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock().unwrap();
        loop {
            if let Some(event) = queue.pop_front() {
                return Some(event);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self.ready.wait_timeout(queue, remaining).unwrap();
            queue = guard;
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
