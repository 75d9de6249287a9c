//! Master statistics.
//!
//! Counters for every operation the master serves, readable while requests
//! are in flight.
//!
//! # Usage
//!
//! ```rust,ignore
//! let master = MasterService::new(MasterConfig::default());
//! // ... serve requests ...
//! let stats = master.stats();
//! println!("puts started: {}", stats.puts_started);
//! println!("no space: {}", stats.no_space_rejections);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct MasterStats {
    // Put protocol
    puts_started: AtomicU64,
    puts_completed: AtomicU64,
    puts_revoked: AtomicU64,
    puts_reclaimed: AtomicU64,

    // Reads and deletes
    replica_lookups: AtomicU64,
    removes: AtomicU64,

    // Segments
    segments_mounted: AtomicU64,
    segments_unmounted: AtomicU64,

    // Failures
    no_space_rejections: AtomicU64,
    errors: AtomicU64,
}

impl MasterStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put_start(&self) {
        self.puts_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put_end(&self) {
        self.puts_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put_revoke(&self) {
        self.puts_revoked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put_reclaimed(&self) {
        self.puts_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replica_lookup(&self) {
        self.replica_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removes(&self, count: u64) {
        self.removes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_mount(&self) {
        self.segments_mounted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unmount(&self) {
        self.segments_unmounted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_no_space(&self) {
        self.no_space_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            puts_started: load(&self.puts_started),
            puts_completed: load(&self.puts_completed),
            puts_revoked: load(&self.puts_revoked),
            puts_reclaimed: load(&self.puts_reclaimed),
            replica_lookups: load(&self.replica_lookups),
            removes: load(&self.removes),
            segments_mounted: load(&self.segments_mounted),
            segments_unmounted: load(&self.segments_unmounted),
            no_space_rejections: load(&self.no_space_rejections),
            errors: load(&self.errors),
        }
    }
}

/// A point-in-time copy of [`MasterStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Successful `put_start` calls.
    pub puts_started: u64,
    /// Successful `put_end` calls.
    pub puts_completed: u64,
    /// Successful `put_revoke` calls.
    pub puts_revoked: u64,
    /// In-flight puts reclaimed after their lease.
    pub puts_reclaimed: u64,
    /// Successful replica list lookups.
    pub replica_lookups: u64,
    /// Objects deleted by `remove` or `remove_all`.
    pub removes: u64,
    /// Segments mounted.
    pub segments_mounted: u64,
    /// Accepted unmount requests, including those issued for unreachable
    /// nodes.
    pub segments_unmounted: u64,
    /// Reservations refused for lack of space.
    pub no_space_rejections: u64,
    /// Failed operations of any kind.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(MasterStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = MasterStats::new();
        stats.record_put_start();
        stats.record_put_start();
        stats.record_put_end();
        stats.record_removes(3);
        stats.record_no_space();

        let snap = stats.snapshot();
        assert_eq!(snap.puts_started, 2);
        assert_eq!(snap.puts_completed, 1);
        assert_eq!(snap.removes, 3);
        assert_eq!(snap.no_space_rejections, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(MasterStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_replica_lookup();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.snapshot().replica_lookups, 1000);
    }
}
