//! Aggregate server statistics.
//!
//! Sessions keep their own local counters and fold them into these totals
//! exactly once, at termination, under one short lock.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use binkp_core::Counters;

/// Shared across the listener and all dialed sessions.
#[derive(Debug, Default)]
pub struct ServerStats {
    sessions_total: AtomicU64,
    sessions_active: AtomicU64,
    totals: Mutex<Counters>,
}

/// A point-in-time copy of the aggregate numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Sessions ever started.
    pub sessions_total: u64,
    /// Sessions currently running.
    pub sessions_active: u64,
    /// Summed transfer counters of completed sessions.
    pub totals: Counters,
}

impl ServerStats {
    /// Fresh zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session started; pairs with [`ServerStats::session_closed`].
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished session's counters into the totals.
    pub fn session_closed(&self, counters: Counters) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
        let mut totals = self.totals.lock().expect("stats lock poisoned");
        totals.bytes_rx += counters.bytes_rx;
        totals.bytes_tx += counters.bytes_tx;
        totals.files_rx += counters.files_rx;
        totals.files_tx += counters.files_tx;
    }

    /// Current aggregate numbers.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            totals: *self.totals.lock().expect("stats lock poisoned"),
        }
    }
}
