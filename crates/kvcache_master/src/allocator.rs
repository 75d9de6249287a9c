//! Replica placement.
//!
//! Picks `replica_count` distinct Active segments for an object and carves a
//! byte range from each. Candidates are ranked by free bytes, largest first,
//! with ties broken by segment id so placement is deterministic. Inside a
//! segment the lowest-offset range that fits wins.
//!
//! A reservation is all-or-nothing: if fewer than `replica_count` segments
//! can take the object, every range carved so far is returned before the
//! error is reported.

use crate::error::{MasterError, MasterResult};
use crate::segment::SegmentRegistry;
use crate::types::{Replica, SegmentId};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

/// A replica together with the segment incarnation it was carved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Placement handed to clients.
    pub replica: Replica,
    /// Generation of the segment at allocation time.
    pub generation: u64,
}

/// Places and releases replicas on the segments of a registry.
#[derive(Debug, Clone)]
pub struct Allocator {
    registry: Arc<SegmentRegistry>,
}

impl Allocator {
    /// Creates an allocator over `registry`.
    #[must_use]
    pub fn new(registry: Arc<SegmentRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry this allocator places into.
    #[must_use]
    pub fn registry(&self) -> &Arc<SegmentRegistry> {
        &self.registry
    }

    /// Reserves `replica_count` ranges of `size` bytes on distinct segments.
    ///
    /// # Errors
    ///
    /// - [`MasterError::InvalidArgument`] if `size` or `replica_count` is zero
    /// - [`MasterError::NoAvailableSegment`] if the ranges cannot be placed;
    ///   no space is consumed in that case
    pub fn reserve(&self, size: u64, replica_count: usize) -> MasterResult<Vec<Allocation>> {
        if size == 0 {
            return Err(MasterError::invalid_argument("object size must be non-zero"));
        }
        if replica_count == 0 {
            return Err(MasterError::invalid_argument("replica count must be at least 1"));
        }

        let mut candidates = self.registry.candidates(size);
        if candidates.len() < replica_count {
            return Err(MasterError::NoAvailableSegment {
                size,
                replica_count,
            });
        }
        candidates.sort_by(|a, b| (Reverse(a.1), &a.0).cmp(&(Reverse(b.1), &b.0)));

        let mut placed = Vec::with_capacity(replica_count);
        for (segment_id, _, handle) in candidates {
            // Free space may have changed since the scan.
            let mut segment = handle.lock();
            let Some(offset) = segment.allocate(size) else {
                continue;
            };
            placed.push(Allocation {
                replica: Replica {
                    segment_id,
                    offset,
                    length: size,
                },
                generation: segment.generation,
            });
            if placed.len() == replica_count {
                break;
            }
        }

        if placed.len() < replica_count {
            debug!(
                "reservation of {} x {} bytes failed after placing {}",
                replica_count,
                size,
                placed.len()
            );
            self.release(&placed);
            return Err(MasterError::NoAvailableSegment {
                size,
                replica_count,
            });
        }
        Ok(placed)
    }

    /// Returns reserved ranges to their segments.
    ///
    /// Ranges on segments that were removed or remounted since the
    /// allocation are skipped. Returns the Draining segments this release
    /// emptied, which are now Removed.
    pub fn release(&self, allocations: &[Allocation]) -> Vec<SegmentId> {
        let mut removed = Vec::new();
        for allocation in allocations {
            let replica = &allocation.replica;
            let Some(handle) = self.registry.handle(&replica.segment_id) else {
                debug!("release on retired segment {}", replica.segment_id);
                continue;
            };
            let emptied = handle
                .lock()
                .release(allocation.generation, replica.offset, replica.length);
            if emptied {
                removed.push((replica.segment_id.clone(), allocation.generation));
            }
        }
        for (segment_id, generation) in &removed {
            debug!("segment {} drained by release", segment_id);
            self.registry.retire(segment_id, *generation);
        }
        removed.into_iter().map(|(segment_id, _)| segment_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::UnmountOutcome;
    use crate::types::NodeId;

    fn registry(segments: &[(&str, u64)]) -> Arc<SegmentRegistry> {
        let registry = Arc::new(SegmentRegistry::new());
        for (id, capacity) in segments {
            registry
                .mount(&SegmentId::new(*id), &NodeId::new("node"), *capacity)
                .unwrap();
        }
        registry
    }

    fn free(registry: &SegmentRegistry, id: &str) -> u64 {
        registry.info(&SegmentId::new(id)).unwrap().free_bytes
    }

    #[test]
    fn replicas_land_on_distinct_segments() {
        let allocator = Allocator::new(registry(&[("a", 100), ("b", 100), ("c", 100)]));
        let placed = allocator.reserve(10, 3).unwrap();

        let mut ids: Vec<_> = placed.iter().map(|a| a.replica.segment_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn most_free_segment_first_ties_by_id() {
        let reg = registry(&[("b", 100), ("a", 100), ("c", 500)]);
        let allocator = Allocator::new(reg);

        let placed = allocator.reserve(10, 2).unwrap();
        assert_eq!(placed[0].replica.segment_id, SegmentId::new("c"));
        assert_eq!(placed[1].replica.segment_id, SegmentId::new("a"));
    }

    #[test]
    fn shortfall_rolls_back() {
        let reg = registry(&[("a", 100), ("b", 5)]);
        let allocator = Allocator::new(Arc::clone(&reg));

        let err = allocator.reserve(10, 2).unwrap_err();
        assert!(matches!(err, MasterError::NoAvailableSegment { .. }));
        assert_eq!(free(&reg, "a"), 100);
        assert_eq!(free(&reg, "b"), 5);
    }

    #[test]
    fn zero_arguments_rejected() {
        let allocator = Allocator::new(registry(&[("a", 100)]));
        assert!(matches!(
            allocator.reserve(0, 1),
            Err(MasterError::InvalidArgument { .. })
        ));
        assert!(matches!(
            allocator.reserve(1, 0),
            Err(MasterError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn release_restores_free_bytes() {
        let reg = registry(&[("a", 100)]);
        let allocator = Allocator::new(Arc::clone(&reg));

        let placed = allocator.reserve(40, 1).unwrap();
        assert_eq!(free(&reg, "a"), 60);
        assert!(allocator.release(&placed).is_empty());
        assert_eq!(free(&reg, "a"), 100);
    }

    #[test]
    fn release_empties_draining_segment() {
        let reg = registry(&[("a", 100)]);
        let allocator = Allocator::new(Arc::clone(&reg));

        let placed = allocator.reserve(40, 1).unwrap();
        reg.unmount(&SegmentId::new("a"), false).unwrap();

        let removed = allocator.release(&placed);
        assert_eq!(removed, vec![SegmentId::new("a")]);
        assert!(reg.info(&SegmentId::new("a")).is_none());
        assert!(reg.list().is_empty());
    }

    #[test]
    fn stale_release_leaves_remounted_segment_alone() {
        let reg = registry(&[("a", 100)]);
        let allocator = Allocator::new(Arc::clone(&reg));

        let old = allocator.reserve(40, 1).unwrap();
        let evicting = reg.unmount(&SegmentId::new("a"), true).unwrap();
        let UnmountOutcome::Evicting { generation, .. } = evicting else {
            panic!("unexpected {evicting:?}");
        };
        reg.complete_eviction(&SegmentId::new("a"), generation);
        reg.mount(&SegmentId::new("a"), &NodeId::new("node"), 100)
            .unwrap();
        let fresh = allocator.reserve(40, 1).unwrap();

        assert!(allocator.release(&old).is_empty());
        assert_eq!(free(&reg, "a"), 60);
        assert!(allocator.release(&fresh).is_empty());
        assert_eq!(free(&reg, "a"), 100);
    }

    #[test]
    fn draining_segment_takes_no_new_replicas() {
        let reg = registry(&[("a", 100), ("b", 100)]);
        let allocator = Allocator::new(Arc::clone(&reg));
        let _held = allocator.reserve(10, 1).unwrap();
        reg.unmount(&SegmentId::new("a"), false).unwrap();

        let placed = allocator.reserve(10, 1).unwrap();
        assert_eq!(placed[0].replica.segment_id, SegmentId::new("b"));
        assert!(allocator.reserve(10, 2).is_err());
    }
}
