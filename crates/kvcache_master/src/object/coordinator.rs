//! Put lifecycle on top of the object table and allocator.
//!
//! Every per-key sequence of check state, allocate or release, then mutate
//! the record runs under the write lock of the key's stripe. Space is
//! reserved before a record is created and released before a record is
//! deleted, so a record never points at bytes that are not reserved.

use super::table::{ObjectEntry, ObjectTable};
use crate::allocator::{Allocation, Allocator};
use crate::config::ConflictPolicy;
use crate::error::{MasterError, MasterResult};
use crate::types::{ObjectState, Replica, SegmentId};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of invalidating the replicas of a force-removed segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// In-flight puts that were revoked.
    pub revoked_puts: usize,
    /// Complete objects deleted because no replica survived.
    pub dropped_objects: usize,
    /// Replicas removed from objects that still have others.
    pub dropped_replicas: usize,
}

/// A put that has been started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedPut {
    /// Where the client should write the payload.
    pub replicas: Vec<Replica>,
    /// True if a complete object under the same key was deleted to make room.
    pub replaced: bool,
}

/// Drives objects through `None -> PutInProgress -> Complete -> None`.
#[derive(Debug)]
pub struct PutCoordinator {
    table: ObjectTable,
    allocator: Allocator,
    lease_ttl: Duration,
    conflict_policy: ConflictPolicy,
}

impl PutCoordinator {
    /// Creates a coordinator placing replicas through `allocator`.
    #[must_use]
    pub fn new(
        allocator: Allocator,
        shards: usize,
        lease_ttl: Duration,
        conflict_policy: ConflictPolicy,
    ) -> Self {
        Self {
            table: ObjectTable::new(shards),
            allocator,
            lease_ttl,
            conflict_policy,
        }
    }

    /// Returns the underlying table.
    #[must_use]
    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    /// Reserves replicas for `key` and records it as PutInProgress.
    ///
    /// Under [`ConflictPolicy::Replace`] a complete object on the key is
    /// deleted only once the new reservation has succeeded.
    ///
    /// # Errors
    ///
    /// - [`MasterError::AlreadyExists`] if the key has an in-flight put, or a
    ///   complete object under [`ConflictPolicy::Reject`]
    /// - [`MasterError::NoAvailableSegment`] or
    ///   [`MasterError::InvalidArgument`] from the allocator
    pub fn put_start(
        &self,
        key: &str,
        size: u64,
        replica_count: usize,
        now: Instant,
    ) -> MasterResult<StartedPut> {
        let mut shard = self.table.shard(key).write();

        let replacing = match shard.get(key).map(|entry| entry.state) {
            None => false,
            Some(ObjectState::Complete) if self.conflict_policy == ConflictPolicy::Replace => true,
            Some(state) => {
                return Err(MasterError::AlreadyExists {
                    key: key.to_string(),
                    state,
                })
            }
        };

        let allocations = self.allocator.reserve(size, replica_count)?;
        let replaced = replacing
            && match shard.remove(key) {
                Some(old) => {
                    debug!("replacing complete object {}", key);
                    self.allocator.release(&old.allocations);
                    true
                }
                None => false,
            };

        let replicas = allocations.iter().map(|a| a.replica.clone()).collect();
        shard.insert(
            key.to_string(),
            ObjectEntry::in_progress(size, allocations, now + self.lease_ttl),
        );
        debug!("put started: {} ({} bytes x {})", key, size, replica_count);
        Ok(StartedPut { replicas, replaced })
    }

    /// Commits an in-flight put.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] without a record, or
    /// [`MasterError::InvalidState`] if the object is already complete.
    pub fn put_end(&self, key: &str) -> MasterResult<()> {
        let mut shard = self.table.shard(key).write();
        let entry = shard
            .get_mut(key)
            .ok_or_else(|| MasterError::object_not_found(key))?;
        if entry.state != ObjectState::PutInProgress {
            return Err(MasterError::InvalidState {
                key: key.to_string(),
                state: entry.state,
                operation: "put_end",
            });
        }
        entry.state = ObjectState::Complete;
        entry.lease_deadline = None;
        debug!("put committed: {}", key);
        Ok(())
    }

    /// Abandons an in-flight put, returning its space.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] without a record, or
    /// [`MasterError::InvalidState`] if the object is already complete.
    pub fn put_revoke(&self, key: &str) -> MasterResult<()> {
        let mut shard = self.table.shard(key).write();
        let entry = shard
            .get(key)
            .ok_or_else(|| MasterError::object_not_found(key))?;
        if entry.state != ObjectState::PutInProgress {
            return Err(MasterError::InvalidState {
                key: key.to_string(),
                state: entry.state,
                operation: "put_revoke",
            });
        }
        self.allocator.release(&entry.allocations);
        shard.remove(key);
        debug!("put revoked: {}", key);
        Ok(())
    }

    /// Deletes `key` in any state, returning its space.
    ///
    /// Returns the state the record was in.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] without a record.
    pub fn remove(&self, key: &str) -> MasterResult<ObjectState> {
        let mut shard = self.table.shard(key).write();
        let entry = shard
            .get(key)
            .ok_or_else(|| MasterError::object_not_found(key))?;
        let (state, size) = (entry.state, entry.size);
        self.allocator.release(&entry.allocations);
        shard.remove(key);
        debug!("removed {} ({}, {} bytes)", key, state, size);
        Ok(state)
    }

    /// Returns the replicas of a complete object.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] if there is no complete object.
    pub fn get_replica_list(&self, key: &str) -> MasterResult<Vec<Replica>> {
        let shard = self.table.shard(key).read();
        match shard.get(key) {
            Some(entry) if entry.state == ObjectState::Complete => Ok(entry.replicas()),
            _ => Err(MasterError::object_not_found(key)),
        }
    }

    /// Returns true if `key` holds a complete object.
    #[must_use]
    pub fn exist_key(&self, key: &str) -> bool {
        self.table.state(key) == Some(ObjectState::Complete)
    }

    /// Deletes every complete object. In-flight puts are kept.
    ///
    /// Returns the number of objects deleted.
    pub fn remove_all(&self) -> usize {
        let mut removed = 0;
        for shard in self.table.shards() {
            let mut shard = shard.write();
            shard.retain(|_, entry| {
                if entry.state != ObjectState::Complete {
                    return true;
                }
                self.allocator.release(&entry.allocations);
                removed += 1;
                false
            });
        }
        debug!("removed {} complete objects", removed);
        removed
    }

    /// Revokes `key` if it is still in flight and its lease passed at `now`.
    pub fn reclaim_expired(&self, key: &str, now: Instant) -> bool {
        let mut shard = self.table.shard(key).write();
        let Some(entry) = shard.get(key) else {
            return false;
        };
        if !entry.lease_expired(now) {
            return false;
        }
        self.allocator.release(&entry.allocations);
        shard.remove(key);
        true
    }

    /// Drops every replica placed on the given incarnation of a segment.
    ///
    /// In-flight puts touching the segment are revoked. Complete objects
    /// lose the affected replicas and are deleted when none remain. Every
    /// dropped replica is released, so the segment empties and is removed
    /// once the last one goes.
    pub fn invalidate_segment(&self, segment_id: &SegmentId, generation: u64) -> Invalidation {
        let on_segment =
            |a: &Allocation| a.replica.segment_id == *segment_id && a.generation == generation;

        let mut report = Invalidation::default();
        for shard in self.table.shards() {
            let mut shard = shard.write();
            shard.retain(|key, entry| {
                if !entry.allocations.iter().any(on_segment) {
                    return true;
                }
                match entry.state {
                    ObjectState::PutInProgress => {
                        self.allocator.release(&entry.allocations);
                        report.revoked_puts += 1;
                        debug!("revoked {}: segment {} removed", key, segment_id);
                        false
                    }
                    ObjectState::Complete => {
                        let (dropped, kept): (Vec<_>, Vec<_>) =
                            entry.allocations.drain(..).partition(|a| on_segment(a));
                        self.allocator.release(&dropped);
                        entry.allocations = kept;
                        if entry.allocations.is_empty() {
                            report.dropped_objects += 1;
                            debug!("dropped {}: no replicas left", key);
                            false
                        } else {
                            report.dropped_replicas += dropped.len();
                            true
                        }
                    }
                }
            });
        }
        report
    }
}
