//! Process-wide observability counters.
//!
//! Peg counters are the only mutable state shared between flows; all access
//! is atomic and lock-free. `MAX_*` counters are ratcheted: they only move
//! when the current value would exceed the recorded maximum. The inspector
//! id is written once by the enclosing framework at startup, before any flow
//! callback runs.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

static PEGS: PegCounters = PegCounters::new();
static INSPECTOR_ID: OnceLock<u32> = OnceLock::new();

/// Access the process-wide peg counters.
pub fn pegs() -> &'static PegCounters {
    &PEGS
}

/// Register the process-wide inspector id. Returns false if an id was
/// already registered (the first registration wins).
pub fn register_inspector_id(id: u32) -> bool {
    INSPECTOR_ID.set(id).is_ok()
}

/// The registered inspector id, if any.
pub fn inspector_id() -> Option<u32> {
    INSPECTOR_ID.get().copied()
}

/// Global counters for sessions, streams, and limit overruns.
#[derive(Debug)]
pub struct PegCounters {
    concurrent_sessions: AtomicU64,
    max_concurrent_sessions: AtomicU64,
    concurrent_streams: AtomicU64,
    max_concurrent_streams: AtomicU64,
    flows_over_stream_limit: AtomicU64,
}

impl PegCounters {
    pub(crate) const fn new() -> Self {
        Self {
            concurrent_sessions: AtomicU64::new(0),
            max_concurrent_sessions: AtomicU64::new(0),
            concurrent_streams: AtomicU64::new(0),
            max_concurrent_streams: AtomicU64::new(0),
            flows_over_stream_limit: AtomicU64::new(0),
        }
    }

    pub(crate) fn session_started(&self) {
        let now = self.concurrent_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        ratchet(&self.max_concurrent_sessions, now);
    }

    pub(crate) fn session_ended(&self) {
        saturating_dec(&self.concurrent_sessions);
    }

    pub(crate) fn stream_opened(&self) {
        let now = self.concurrent_streams.fetch_add(1, Ordering::Relaxed) + 1;
        ratchet(&self.max_concurrent_streams, now);
    }

    pub(crate) fn stream_closed(&self) {
        saturating_dec(&self.concurrent_streams);
    }

    pub(crate) fn flow_over_stream_limit(&self) {
        self.flows_over_stream_limit.fetch_add(1, Ordering::Relaxed);
    }

    /// Live flow contexts at this instant.
    pub fn concurrent_sessions(&self) -> u64 {
        self.concurrent_sessions.load(Ordering::Relaxed)
    }

    /// High-water mark of concurrent sessions.
    pub fn max_concurrent_sessions(&self) -> u64 {
        self.max_concurrent_sessions.load(Ordering::Relaxed)
    }

    /// Live non-zero streams across all flows.
    pub fn concurrent_streams(&self) -> u64 {
        self.concurrent_streams.load(Ordering::Relaxed)
    }

    /// High-water mark of concurrent streams.
    pub fn max_concurrent_streams(&self) -> u64 {
        self.max_concurrent_streams.load(Ordering::Relaxed)
    }

    /// Flows that attempted to exceed the concurrent stream cap.
    pub fn flows_over_stream_limit(&self) -> u64 {
        self.flows_over_stream_limit.load(Ordering::Relaxed)
    }
}

fn ratchet(max: &AtomicU64, candidate: u64) {
    let mut recorded = max.load(Ordering::Relaxed);
    while candidate > recorded {
        match max.compare_exchange_weak(recorded, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => recorded = actual,
        }
    }
}

fn saturating_dec(counter: &AtomicU64) {
    let mut current = counter.load(Ordering::Relaxed);
    while current > 0 {
        match counter.compare_exchange_weak(
            current,
            current - 1,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratchet_only_moves_up() {
        let counters = PegCounters::new();
        counters.session_started();
        counters.session_started();
        assert_eq!(counters.max_concurrent_sessions(), 2);

        counters.session_ended();
        counters.session_ended();
        assert_eq!(counters.concurrent_sessions(), 0);
        assert_eq!(counters.max_concurrent_sessions(), 2);

        counters.session_started();
        assert_eq!(counters.max_concurrent_sessions(), 2);
    }

    #[test]
    fn test_decrement_saturates_at_zero() {
        let counters = PegCounters::new();
        counters.stream_closed();
        assert_eq!(counters.concurrent_streams(), 0);
    }

    #[test]
    fn test_stream_high_water_mark() {
        let counters = PegCounters::new();
        for _ in 0..5 {
            counters.stream_opened();
        }
        for _ in 0..3 {
            counters.stream_closed();
        }
        assert_eq!(counters.concurrent_streams(), 2);
        assert_eq!(counters.max_concurrent_streams(), 5);
    }
}
