#![warn(missing_docs)]
//! Passive HTTP/2 multiplexed-connection inspector.
//!
//! This crate consumes both directions of an observed TCP connection,
//! carves the byte streams into HTTP/2 frames, tracks up to a configured
//! number of concurrent streams, decodes HPACK-compressed header blocks
//! (dynamic table state preserved per direction across blocks), and hands
//! each stream's reassembled request/response to a downstream HTTP/1-shaped
//! inspector. It never originates traffic, never blocks, and treats
//! malformed input as observability data (infractions and events) rather
//! than failures.
//!
//! # Key types
//!
//! - [`FlowContext`] — state engine for a single connection. Feed bytes with
//!   [`on_segment()`](FlowContext::on_segment) per direction; the owned
//!   [`HttpInspector`] receives the reassembled messages.
//! - [`FlowCache`] — thread-safe cache of many flows keyed by an arbitrary
//!   `K`, for callers without their own flow table.
//! - [`HttpInspector`] — the downstream seam: implement it to receive
//!   HTTP/1-shaped start lines, headers, and body chunks per stream.
//!
//! # Example
//!
//! ```
//! use h2inspect::{FlowCache, NullInspector, Side};
//!
//! let cache: FlowCache<u64, NullInspector> = FlowCache::new();
//!
//! // Feed each captured segment to the flow it belongs to
//! cache.on_segment(42, Side::Client, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n");
//!
//! // Inspect accumulated infractions, then tear the flow down
//! let flow = cache.remove(&42).unwrap();
//! assert!(flow.infractions(Side::Client).is_empty());
//! ```
//!
//! # Feature flags
//!
//! - **`tracing`** — emit `tracing::warn!` events for non-fatal parse issues
//!   (continuation discipline violations, refused streams, etc.)

mod adapter;
mod config;
mod flow;
mod frame;
mod hpack;
mod infractions;
mod pegs;
mod splitter;
mod stream;


#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) }
}
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}
pub(crate) use trace_warn;

use std::hash::Hash;
use std::sync::Mutex;

use dashmap::DashMap;

pub use adapter::{Http1Headers, HttpInspector, InspectError, MessageKind, NullInspector};
pub use config::InspectConfig;
pub use flow::{FlowContext, STREAM_MEMORY_TRACKING_INCREMENT};
pub use frame::{CONNECTION_PREFACE, FrameType, is_http2_preface, looks_like_http2_frame};
pub use hpack::{HeaderList, HpackError};
pub use infractions::{EventQueue, Infraction, Infractions};
pub use pegs::{PegCounters, inspector_id, pegs, register_inspector_id};
pub use stream::{StreamId, StreamState};

/// One direction of a flow: the side that sent the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Client-to-server direction
    Client,
    /// Server-to-client direction
    Server,
}

impl Side {
    pub(crate) fn idx(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 1,
        }
    }

    /// The opposite direction.
    pub fn other(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

/// Flow cache with generic connection keys.
///
/// Each entry is a `Mutex<FlowContext>` stored in a `DashMap`. The map's
/// shard lock covers only the lookup or insert of an entry; the per-key
/// mutex then makes overlapping calls for the same connection take turns.
/// Both levels matter: if racing threads could each materialize a fresh
/// context for one key, whichever insert lost would silently discard its
/// counterpart's accumulated state — HPACK dynamic tables, open streams,
/// half-parsed frames — mid-connection, and every header block after that
/// point would decode against the wrong table.
pub struct FlowCache<K, I: HttpInspector> {
    flows: DashMap<K, Mutex<FlowContext<I>>>,
    config: InspectConfig,
}

impl<K: Hash + Eq + Clone, I: HttpInspector + Default> FlowCache<K, I> {
    /// Create a cache with default limits.
    pub fn new() -> Self {
        Self::with_config(InspectConfig::default())
    }

    /// Create a cache whose flows use the given limits.
    pub fn with_config(config: InspectConfig) -> Self {
        Self {
            flows: DashMap::new(),
            config,
        }
    }

    /// Feed one segment for the flow identified by `key`, creating the flow
    /// on first use.
    pub fn on_segment(&self, key: K, side: Side, data: &[u8]) {
        // entry() either finds the flow or creates it under the shard lock,
        // so at most one context ever exists per key
        self.flows
            .entry(key.clone())
            .or_insert_with(|| Mutex::new(FlowContext::new(self.config.clone(), I::default())));

        let entry = self.flows.get(&key).expect("entry inserted above");
        let mut flow = entry.lock().unwrap_or_else(|e| e.into_inner());
        flow.on_segment(side, data);
    }

    /// Signal EOF on one direction of the flow, if it exists.
    pub fn on_eof(&self, key: &K, side: Side) {
        if let Some(entry) = self.flows.get(key) {
            let mut flow = entry.lock().unwrap_or_else(|e| e.into_inner());
            flow.on_eof(side);
        }
    }

    /// Run `f` against the flow for `key`, if it exists.
    pub fn with_flow<R>(&self, key: &K, f: impl FnOnce(&mut FlowContext<I>) -> R) -> Option<R> {
        let entry = self.flows.get(key)?;
        let mut flow = entry.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&mut flow))
    }

    /// Remove and return the flow (call when the connection closes; dropping
    /// the returned context releases its accounting).
    pub fn remove(&self, key: &K) -> Option<FlowContext<I>> {
        self.flows
            .remove(key)
            .map(|(_, mutex)| mutex.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    /// Check if a flow exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.flows.contains_key(key)
    }

    /// Number of tracked flows.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl<K: Hash + Eq + Clone, I: HttpInspector + Default> Default for FlowCache<K, I> {
    fn default() -> Self {
        Self::new()
    }
}
