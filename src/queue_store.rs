//! In-memory queue catalog: named queues, retained messages with per-message
//! TTL, and subscriber sets. Pure state — no I/O, no locking of its own
//! (callers hold `queues_lock` around every call; see [`SharedQueueStore`]).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::session::ClientId;

/// Shared, lock-guarded handle to the catalog. Every operation below is
/// atomic with respect to other holders of the same lock.
pub type SharedQueueStore = Arc<Mutex<QueueStore>>;

/// A single retained, published message. Immutable after publish.
#[derive(Debug, Clone)]
pub struct Message {
    /// Raw message bytes.
    pub text: Vec<u8>,
    /// Monotonic instant at which this message stops being retained.
    pub expires_at: Instant,
}

impl Message {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// A named queue: retained messages in publish order, plus its subscribers.
#[derive(Debug, Default)]
pub struct Queue {
    messages: VecDeque<Message>,
    subscribers: HashSet<ClientId>,
}

impl Queue {
    /// Current subscriber set, for tests and diagnostics.
    pub fn subscribers(&self) -> &HashSet<ClientId> {
        &self.subscribers
    }
}

/// Outcome of [`QueueStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Queue created.
    Created,
    /// A queue with this name already exists.
    AlreadyExists,
}

/// Outcome of [`QueueStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Subscription added.
    Subscribed,
    /// Already a subscriber of this queue.
    AlreadySubscribed,
    /// No such queue.
    NotFound,
}

/// Outcome of [`QueueStore::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// Subscription removed.
    Unsubscribed,
    /// Was not subscribed.
    NotSubscribed,
    /// No such queue.
    NotFound,
}

/// The queue catalog. Insertion order of queue names is tracked separately
/// so [`QueueStore::snapshot`] returns a stable, deterministic ordering.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: HashMap<String, Queue>,
    order: Vec<String>,
}

impl QueueStore {
    /// Construct an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh catalog in the shared, lock-guarded handle.
    pub fn shared() -> SharedQueueStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Create a new, empty queue.
    pub fn create(&mut self, name: &str) -> CreateOutcome {
        if self.queues.contains_key(name) {
            return CreateOutcome::AlreadyExists;
        }
        self.queues.insert(name.to_string(), Queue::default());
        self.order.push(name.to_string());
        CreateOutcome::Created
    }

    /// Delete a queue, returning the subscriber ids that must be notified,
    /// or `None` if the queue does not exist.
    pub fn delete(&mut self, name: &str) -> Option<Vec<ClientId>> {
        let queue = self.queues.remove(name)?;
        self.order.retain(|n| n != name);
        Some(queue.subscribers.into_iter().collect())
    }

    /// Subscribe `id` to `name`.
    pub fn subscribe(&mut self, name: &str, id: &ClientId) -> SubscribeOutcome {
        match self.queues.get_mut(name) {
            None => SubscribeOutcome::NotFound,
            Some(queue) => {
                if !queue.subscribers.insert(id.clone()) {
                    SubscribeOutcome::AlreadySubscribed
                } else {
                    SubscribeOutcome::Subscribed
                }
            }
        }
    }

    /// Unsubscribe `id` from `name`.
    pub fn unsubscribe(&mut self, name: &str, id: &ClientId) -> UnsubscribeOutcome {
        match self.queues.get_mut(name) {
            None => UnsubscribeOutcome::NotFound,
            Some(queue) => {
                if queue.subscribers.remove(id) {
                    UnsubscribeOutcome::Unsubscribed
                } else {
                    UnsubscribeOutcome::NotSubscribed
                }
            }
        }
    }

    /// Publish `text` to `name` with the given TTL (seconds), returning the
    /// subscriber ids to fan the message out to, or `None` if the queue
    /// does not exist.
    pub fn publish(
        &mut self,
        name: &str,
        text: Vec<u8>,
        ttl_secs: u32,
        now: Instant,
    ) -> Option<Vec<ClientId>> {
        let queue = self.queues.get_mut(name)?;
        let expires_at = now + std::time::Duration::from_secs(u64::from(ttl_secs));
        queue.messages.push_back(Message { text, expires_at });
        Some(queue.subscribers.iter().cloned().collect())
    }

    /// Ordered snapshot of all queue names (insertion order).
    pub fn snapshot(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Drain the non-expired retained messages of `name`, in publish order,
    /// dropping expired ones in place. Returns `None` if the queue does not
    /// exist.
    pub fn drain_retained(&mut self, name: &str, now: Instant) -> Option<Vec<Vec<u8>>> {
        let queue = self.queues.get_mut(name)?;
        queue.messages.retain(|m| !m.is_expired(now));
        Some(queue.messages.iter().map(|m| m.text.clone()).collect())
    }

    /// Sweep every queue, dropping messages whose TTL has elapsed.
    pub fn evict_expired(&mut self, now: Instant) {
        for queue in self.queues.values_mut() {
            queue.messages.retain(|m| !m.is_expired(now));
        }
    }

    /// Remove `id` from every queue's subscriber set.
    pub fn purge_subscriber(&mut self, id: &ClientId) {
        for queue in self.queues.values_mut() {
            queue.subscribers.remove(id);
        }
    }

    /// Look up a queue for read-only inspection (tests / diagnostics).
    pub fn get(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> ClientId {
        ClientId::new(s).unwrap()
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let mut store = QueueStore::new();
        assert_eq!(store.create("q"), CreateOutcome::Created);
        assert_eq!(store.create("q"), CreateOutcome::AlreadyExists);
    }

    #[test]
    fn subscribe_is_idempotent_and_reported() {
        let mut store = QueueStore::new();
        store.create("q");
        let alice = id("alice");
        assert_eq!(store.subscribe("q", &alice), SubscribeOutcome::Subscribed);
        assert_eq!(
            store.subscribe("q", &alice),
            SubscribeOutcome::AlreadySubscribed
        );
        assert_eq!(store.get("q").unwrap().subscribers().len(), 1);
    }

    #[test]
    fn subscribe_unknown_queue_is_not_found() {
        let mut store = QueueStore::new();
        assert_eq!(
            store.subscribe("missing", &id("alice")),
            SubscribeOutcome::NotFound
        );
    }

    #[test]
    fn publish_and_drain_retained_preserves_order() {
        let mut store = QueueStore::new();
        store.create("q");
        let now = Instant::now();
        store.publish("q", b"one".to_vec(), 60, now);
        store.publish("q", b"two".to_vec(), 60, now);
        let drained = store.drain_retained("q", now).unwrap();
        assert_eq!(drained, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn expired_messages_are_dropped_on_drain() {
        let mut store = QueueStore::new();
        store.create("q");
        let t0 = Instant::now();
        store.publish("q", b"short-lived".to_vec(), 1, t0);
        let later = t0 + Duration::from_secs(2);
        let drained = store.drain_retained("q", later).unwrap();
        assert!(drained.is_empty());
    }

    #[test]
    fn evict_expired_sweeps_all_queues() {
        let mut store = QueueStore::new();
        store.create("a");
        store.create("b");
        let t0 = Instant::now();
        store.publish("a", b"x".to_vec(), 1, t0);
        store.publish("b", b"y".to_vec(), 3600, t0);
        store.evict_expired(t0 + Duration::from_secs(2));
        assert_eq!(store.drain_retained("a", t0).unwrap().len(), 0);
        assert_eq!(store.drain_retained("b", t0).unwrap().len(), 1);
    }

    #[test]
    fn delete_returns_subscribers_and_removes_queue() {
        let mut store = QueueStore::new();
        store.create("q");
        let alice = id("alice");
        let bob = id("bob");
        store.subscribe("q", &alice);
        store.subscribe("q", &bob);
        let mut subs = store.delete("q").unwrap();
        subs.sort();
        let mut expected = vec![alice, bob];
        expected.sort();
        assert_eq!(subs, expected);
        assert!(store.delete("q").is_none());
    }

    #[test]
    fn purge_subscriber_removes_from_every_queue() {
        let mut store = QueueStore::new();
        store.create("a");
        store.create("b");
        let alice = id("alice");
        store.subscribe("a", &alice);
        store.subscribe("b", &alice);
        store.purge_subscriber(&alice);
        assert!(store.get("a").unwrap().subscribers().is_empty());
        assert!(store.get("b").unwrap().subscribers().is_empty());
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let mut store = QueueStore::new();
        store.create("b");
        store.create("a");
        store.create("c");
        assert_eq!(store.snapshot(), vec!["b", "a", "c"]);
        store.delete("a");
        assert_eq!(store.snapshot(), vec!["b", "c"]);
    }
}
