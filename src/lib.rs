//! Single-host publish/subscribe message broker: framed wire protocol,
//! concurrent session/queue engine, and a client library built on the same
//! protocol.
//!
//! - [`protocol`] — frame codec and payload sub-formats (C1, C8).
//! - [`queue_store`] — queue catalog with TTL-bounded retained messages (C2).
//! - [`session`] — login identity → session record, grace-period reconnect (C3).
//! - [`server`] — connection handler, fan-out, background worker (C4–C6).
//! - [`client`] — receiver loop and polling event API (C7).

pub mod client;
pub mod error;
pub mod protocol;
pub mod queue_store;
pub mod server;
pub mod session;

/// Default TCP read timeout for an authenticated connection (§4.4).
pub const CLIENT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(45);

/// Interval between background-worker heartbeat/eviction sweeps (§4.6).
pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Tick granularity of the background worker, for shutdown responsiveness.
pub const WORKER_TICK: std::time::Duration = std::time::Duration::from_secs(1);

/// Minimum accepted publish TTL, in seconds.
pub const MIN_TTL_SECS: u32 = 1;
/// Maximum accepted publish TTL, in seconds.
pub const MAX_TTL_SECS: u32 = 3600;

/// Maximum queue-name length, in bytes (§6).
pub const MAX_QUEUE_NAME_LEN: usize = 64;
