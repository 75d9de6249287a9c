//! Striped key to object record map.

use crate::allocator::Allocation;
use crate::locks::Striped;
use crate::types::{ObjectState, Replica};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;

/// The record kept for one key.
#[derive(Debug, Clone)]
pub(crate) struct ObjectEntry {
    pub(crate) size: u64,
    pub(crate) allocations: Vec<Allocation>,
    pub(crate) state: ObjectState,
    /// Set while the put is in progress.
    pub(crate) lease_deadline: Option<Instant>,
}

impl ObjectEntry {
    pub(crate) fn in_progress(size: u64, allocations: Vec<Allocation>, deadline: Instant) -> Self {
        Self {
            size,
            allocations,
            state: ObjectState::PutInProgress,
            lease_deadline: Some(deadline),
        }
    }

    pub(crate) fn replicas(&self) -> Vec<Replica> {
        self.allocations.iter().map(|a| a.replica.clone()).collect()
    }

    pub(crate) fn lease_expired(&self, now: Instant) -> bool {
        self.state == ObjectState::PutInProgress
            && self.lease_deadline.is_some_and(|deadline| deadline <= now)
    }
}

pub(crate) type Shard = HashMap<String, ObjectEntry>;

/// Object records partitioned over a fixed set of lock stripes.
#[derive(Debug)]
pub struct ObjectTable {
    shards: Striped<Shard>,
}

/// Record counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    /// Puts reserved but not yet committed.
    pub in_progress: usize,
    /// Committed, readable objects.
    pub complete: usize,
}

impl ObjectCounts {
    /// Total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.in_progress + self.complete
    }
}

impl ObjectTable {
    /// Creates a table with `shards` stripes (rounded up to a power of two).
    #[must_use]
    pub fn new(shards: usize) -> Self {
        Self {
            shards: Striped::new(shards),
        }
    }

    pub(crate) fn shard(&self, key: &str) -> &RwLock<Shard> {
        self.shards.stripe(key)
    }

    pub(crate) fn shards(&self) -> impl Iterator<Item = &RwLock<Shard>> {
        self.shards.iter()
    }

    /// Returns the number of stripes.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the state of `key`, or `None` if no record exists.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<ObjectState> {
        self.shard(key).read().get(key).map(|entry| entry.state)
    }

    /// Returns keys whose put lease has passed at `now`.
    #[must_use]
    pub fn expired_puts(&self, now: Instant) -> Vec<String> {
        let mut keys = Vec::new();
        for shard in self.shards() {
            let shard = shard.read();
            keys.extend(
                shard
                    .iter()
                    .filter(|(_, entry)| entry.lease_expired(now))
                    .map(|(key, _)| key.clone()),
            );
        }
        keys
    }

    /// Counts records by state.
    #[must_use]
    pub fn counts(&self) -> ObjectCounts {
        let mut counts = ObjectCounts::default();
        for shard in self.shards() {
            for entry in shard.read().values() {
                match entry.state {
                    ObjectState::PutInProgress => counts.in_progress += 1,
                    ObjectState::Complete => counts.complete += 1,
                }
            }
        }
        counts
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards().map(|shard| shard.read().len()).sum()
    }

    /// Returns true if no record exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards().all(|shard| shard.read().is_empty())
    }
}
