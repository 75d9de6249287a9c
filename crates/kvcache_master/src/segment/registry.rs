//! Segment records and the registry that owns them.

use super::extent::ExtentMap;
use crate::error::{MasterError, MasterResult};
use crate::types::{NodeId, SegmentId, SegmentInfo, SegmentStatus};
use kvcache_plugin::MetadataStore;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SEGMENT_KEY_PREFIX: &str = "kvcache/segments/";

/// One mounted segment.
///
/// `generation` distinguishes successive mounts of the same id, so a replica
/// placed on an earlier incarnation can never free bytes of a later one.
#[derive(Debug)]
pub(crate) struct Segment {
    pub(crate) id: SegmentId,
    pub(crate) owner: NodeId,
    pub(crate) capacity: u64,
    pub(crate) status: SegmentStatus,
    pub(crate) generation: u64,
    pub(crate) replica_count: usize,
    extents: ExtentMap,
}

impl Segment {
    fn new(id: SegmentId, owner: NodeId, capacity: u64, generation: u64) -> Self {
        Self {
            id,
            owner,
            capacity,
            status: SegmentStatus::Active,
            generation,
            replica_count: 0,
            extents: ExtentMap::new(capacity),
        }
    }

    pub(crate) fn free_bytes(&self) -> u64 {
        self.extents.free_bytes()
    }

    pub(crate) fn info(&self) -> SegmentInfo {
        SegmentInfo {
            segment_id: self.id.clone(),
            owner: self.owner.clone(),
            capacity: self.capacity,
            free_bytes: self.free_bytes(),
            status: self.status,
            replica_count: self.replica_count,
        }
    }

    /// Carves `len` bytes for a new replica. Only Active segments allocate.
    pub(crate) fn allocate(&mut self, len: u64) -> Option<u64> {
        if self.status != SegmentStatus::Active {
            return None;
        }
        let offset = self.extents.allocate(len)?;
        self.replica_count += 1;
        Some(offset)
    }

    /// Returns a replica's bytes. Returns true if this released the last
    /// replica of a draining segment, which is then Removed.
    pub(crate) fn release(&mut self, generation: u64, offset: u64, len: u64) -> bool {
        if self.generation != generation || self.status == SegmentStatus::Removed {
            return false;
        }
        if !self.extents.release(offset, len) {
            warn!(
                "segment {} rejected release of [{}, +{}): range not allocated",
                self.id, offset, len
            );
            return false;
        }
        self.replica_count = self.replica_count.saturating_sub(1);
        if self.status == SegmentStatus::Draining && self.replica_count == 0 {
            self.status = SegmentStatus::Removed;
            return true;
        }
        false
    }
}

/// Result of a successful mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// A new segment record was created.
    Mounted,
    /// An identical Active segment already existed; nothing changed.
    Unchanged,
}

/// Result of a successful unmount request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// The segment holds replicas and has stopped taking new ones.
    Draining {
        /// Replicas still allocated from the segment.
        replica_count: usize,
    },
    /// The segment was already draining; nothing changed.
    StillDraining {
        /// Replicas still allocated from the segment.
        replica_count: usize,
    },
    /// Forced unmount of a segment holding replicas.
    ///
    /// The segment is Draining and cannot be remounted. The caller must drop
    /// every replica of this generation, then call
    /// [`SegmentRegistry::complete_eviction`].
    Evicting {
        /// Generation being evicted.
        generation: u64,
        /// Replicas allocated when the eviction began.
        replica_count: usize,
    },
    /// The segment held no replicas and is gone.
    Removed {
        /// Generation of the removed incarnation.
        generation: u64,
    },
}

impl UnmountOutcome {
    /// Returns false if the request found the segment already draining.
    #[must_use]
    pub fn changed_status(&self) -> bool {
        !matches!(self, Self::StillDraining { .. })
    }
}

/// Owner of all segment records.
///
/// The id map is behind a read-write lock taken exclusively only to insert
/// records; each segment sits behind its own mutex, which serializes every
/// allocation and release against that segment.
pub struct SegmentRegistry {
    segments: RwLock<BTreeMap<SegmentId, Arc<Mutex<Segment>>>>,
    next_generation: AtomicU64,
    store: Option<Arc<dyn MetadataStore>>,
}

impl SegmentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(BTreeMap::new()),
            next_generation: AtomicU64::new(1),
            store: None,
        }
    }

    /// Creates an empty registry that mirrors segment records into `store`.
    #[must_use]
    pub fn with_store(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub(crate) fn handle(&self, segment_id: &SegmentId) -> Option<Arc<Mutex<Segment>>> {
        self.segments.read().get(segment_id).cloned()
    }

    /// Registers a segment with its full capacity free.
    ///
    /// # Errors
    ///
    /// - [`MasterError::InvalidArgument`] for a zero capacity
    /// - [`MasterError::AlreadyMounted`] if the id is mounted (Active or
    ///   Draining) with a different owner or capacity, or is Draining
    pub fn mount(
        &self,
        segment_id: &SegmentId,
        owner: &NodeId,
        capacity: u64,
    ) -> MasterResult<MountOutcome> {
        if capacity == 0 {
            return Err(MasterError::invalid_argument("segment capacity must be non-zero"));
        }

        let info = {
            let mut segments = self.segments.write();
            if let Some(existing) = segments.get(segment_id) {
                let existing = existing.lock();
                match existing.status {
                    SegmentStatus::Removed => {}
                    SegmentStatus::Active
                        if existing.owner == *owner && existing.capacity == capacity =>
                    {
                        debug!("segment {} already mounted", segment_id);
                        return Ok(MountOutcome::Unchanged);
                    }
                    _ => {
                        return Err(MasterError::AlreadyMounted {
                            segment_id: segment_id.clone(),
                        })
                    }
                }
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let segment = Segment::new(segment_id.clone(), owner.clone(), capacity, generation);
            let info = segment.info();
            segments.insert(segment_id.clone(), Arc::new(Mutex::new(segment)));
            info
        };

        info!(
            "mounted segment {} ({} bytes) owned by {}",
            segment_id, capacity, owner
        );
        self.publish(&info);
        Ok(MountOutcome::Mounted)
    }

    /// Stops allocations from a segment and removes it when possible.
    ///
    /// An empty segment is removed at once. Otherwise the segment becomes
    /// Draining and is removed when its last replica is released. With
    /// `force` the caller is expected to drop those replicas itself; see
    /// [`UnmountOutcome::Evicting`].
    ///
    /// # Errors
    ///
    /// [`MasterError::SegmentNotFound`] if the id is unknown or Removed.
    pub fn unmount(&self, segment_id: &SegmentId, force: bool) -> MasterResult<UnmountOutcome> {
        let handle = self
            .handle(segment_id)
            .ok_or_else(|| MasterError::segment_not_found(segment_id))?;

        let outcome = {
            let mut segment = handle.lock();
            let replica_count = segment.replica_count;
            match segment.status {
                SegmentStatus::Removed => return Err(MasterError::segment_not_found(segment_id)),
                _ if replica_count == 0 => {
                    segment.status = SegmentStatus::Removed;
                    UnmountOutcome::Removed {
                        generation: segment.generation,
                    }
                }
                _ if force => {
                    segment.status = SegmentStatus::Draining;
                    UnmountOutcome::Evicting {
                        generation: segment.generation,
                        replica_count,
                    }
                }
                SegmentStatus::Draining => UnmountOutcome::StillDraining { replica_count },
                SegmentStatus::Active => {
                    segment.status = SegmentStatus::Draining;
                    UnmountOutcome::Draining { replica_count }
                }
            }
        };

        match outcome {
            UnmountOutcome::Removed { generation } => {
                info!("removed segment {}", segment_id);
                self.retire(segment_id, generation);
            }
            UnmountOutcome::Evicting { replica_count, .. } => {
                info!(
                    "evicting segment {}, {} replicas to drop",
                    segment_id, replica_count
                );
            }
            UnmountOutcome::Draining { replica_count } => {
                info!(
                    "segment {} draining, {} replicas outstanding",
                    segment_id, replica_count
                );
            }
            UnmountOutcome::StillDraining { .. } => {}
        }
        Ok(outcome)
    }

    /// Finishes a forced unmount once the replicas of `generation` have been
    /// dropped from their objects.
    ///
    /// Usually the releases made while dropping them already removed the
    /// segment. Returns the number of replicas still counted against it,
    /// which are discarded.
    pub fn complete_eviction(&self, segment_id: &SegmentId, generation: u64) -> usize {
        let Some(handle) = self.handle(segment_id) else {
            return 0;
        };
        let leaked = {
            let mut segment = handle.lock();
            if segment.generation != generation || segment.status == SegmentStatus::Removed {
                return 0;
            }
            let leaked = segment.replica_count;
            segment.status = SegmentStatus::Removed;
            segment.replica_count = 0;
            leaked
        };
        if leaked > 0 {
            warn!("segment {} removed with {} unreleased replicas", segment_id, leaked);
        }
        self.retire(segment_id, generation);
        leaked
    }

    /// Promotes a Draining segment with no replicas to Removed.
    ///
    /// Returns false if the segment is not Draining or still holds replicas.
    ///
    /// # Errors
    ///
    /// [`MasterError::SegmentNotFound`] if the id was never mounted.
    pub fn finalize_drained(&self, segment_id: &SegmentId) -> MasterResult<bool> {
        let handle = self
            .handle(segment_id)
            .ok_or_else(|| MasterError::segment_not_found(segment_id))?;

        let removed = {
            let mut segment = handle.lock();
            if segment.status == SegmentStatus::Draining && segment.replica_count == 0 {
                segment.status = SegmentStatus::Removed;
                Some(segment.generation)
            } else {
                None
            }
        };
        if let Some(generation) = removed {
            info!("drained segment {} removed", segment_id);
            self.retire(segment_id, generation);
        }
        Ok(removed.is_some())
    }

    /// Returns Draining segments that no longer hold replicas.
    #[must_use]
    pub fn drained(&self) -> Vec<SegmentId> {
        self.segments
            .read()
            .values()
            .filter_map(|handle| {
                let segment = handle.lock();
                (segment.status == SegmentStatus::Draining && segment.replica_count == 0)
                    .then(|| segment.id.clone())
            })
            .collect()
    }

    /// Returns the non-Removed segments contributed by `owner`.
    #[must_use]
    pub fn owned_by(&self, owner: &NodeId) -> Vec<SegmentId> {
        self.segments
            .read()
            .values()
            .filter_map(|handle| {
                let segment = handle.lock();
                (segment.owner == *owner && segment.status != SegmentStatus::Removed)
                    .then(|| segment.id.clone())
            })
            .collect()
    }

    /// Returns Active segments with at least `size` free bytes, with their
    /// free byte count at the time of the scan.
    pub(crate) fn candidates(&self, size: u64) -> Vec<(SegmentId, u64, Arc<Mutex<Segment>>)> {
        self.segments
            .read()
            .iter()
            .filter_map(|(id, handle)| {
                let segment = handle.lock();
                let free = segment.free_bytes();
                (segment.status == SegmentStatus::Active && free >= size)
                    .then(|| (id.clone(), free, Arc::clone(handle)))
            })
            .collect()
    }

    /// Returns a snapshot of one segment.
    #[must_use]
    pub fn info(&self, segment_id: &SegmentId) -> Option<SegmentInfo> {
        self.handle(segment_id).map(|handle| handle.lock().info())
    }

    /// Returns a snapshot of every segment, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<SegmentInfo> {
        self.segments
            .read()
            .values()
            .map(|handle| handle.lock().info())
            .collect()
    }

    /// Forgets a removed segment incarnation and its externalized record.
    ///
    /// A newer incarnation mounted under the same id is left alone.
    pub(crate) fn retire(&self, segment_id: &SegmentId, generation: u64) {
        {
            let mut segments = self.segments.write();
            let stale = segments.get(segment_id).is_some_and(|handle| {
                let segment = handle.lock();
                segment.generation == generation && segment.status == SegmentStatus::Removed
            });
            if !stale {
                return;
            }
            segments.remove(segment_id);
        }
        if let Some(store) = &self.store {
            let key = format!("{SEGMENT_KEY_PREFIX}{segment_id}");
            if let Err(e) = store.remove(&key) {
                warn!("failed to remove metadata for segment {}: {}", segment_id, e);
            }
        }
    }

    fn publish(&self, info: &SegmentInfo) {
        let Some(store) = &self.store else {
            return;
        };
        let key = format!("{SEGMENT_KEY_PREFIX}{}", info.segment_id);
        let doc = serde_json::json!({
            "segment_id": info.segment_id,
            "owner": info.owner,
            "capacity": info.capacity,
        });
        if let Err(e) = store.set(&key, &doc) {
            warn!("failed to persist metadata for segment {}: {}", info.segment_id, e);
        }
    }
}

impl Default for SegmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SegmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRegistry")
            .field("segments", &self.segments.read().len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvcache_plugin::InMemoryMetadataStore;

    fn seg(id: &str) -> SegmentId {
        SegmentId::new(id)
    }

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn mount_registers_full_capacity() {
        let registry = SegmentRegistry::new();
        let outcome = registry.mount(&seg("s1"), &node("n1"), 1024).unwrap();
        assert_eq!(outcome, MountOutcome::Mounted);

        let info = registry.info(&seg("s1")).unwrap();
        assert_eq!(info.free_bytes, 1024);
        assert_eq!(info.status, SegmentStatus::Active);
    }

    #[test]
    fn identical_remount_is_noop() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 1024).unwrap();
        let outcome = registry.mount(&seg("s1"), &node("n1"), 1024).unwrap();
        assert_eq!(outcome, MountOutcome::Unchanged);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn remount_with_other_capacity_rejected() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 1024).unwrap();
        assert!(matches!(
            registry.mount(&seg("s1"), &node("n1"), 2048),
            Err(MasterError::AlreadyMounted { .. })
        ));
        assert!(matches!(
            registry.mount(&seg("s1"), &node("n2"), 1024),
            Err(MasterError::AlreadyMounted { .. })
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        let registry = SegmentRegistry::new();
        assert!(matches!(
            registry.mount(&seg("s1"), &node("n1"), 0),
            Err(MasterError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unmount_empty_segment_removes_immediately() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        let outcome = registry.unmount(&seg("s1"), false).unwrap();
        assert!(matches!(outcome, UnmountOutcome::Removed { .. }));
        assert!(registry.info(&seg("s1")).is_none());
        assert!(matches!(
            registry.unmount(&seg("s1"), false),
            Err(MasterError::SegmentNotFound { .. })
        ));
    }

    #[test]
    fn unmount_with_replicas_drains_until_released() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        let handle = registry.handle(&seg("s1")).unwrap();
        let (offset, generation) = {
            let mut s = handle.lock();
            (s.allocate(16).unwrap(), s.generation)
        };

        let outcome = registry.unmount(&seg("s1"), false).unwrap();
        assert_eq!(outcome, UnmountOutcome::Draining { replica_count: 1 });
        assert!(registry.candidates(1).is_empty());
        let repeat = registry.unmount(&seg("s1"), false).unwrap();
        assert_eq!(repeat, UnmountOutcome::StillDraining { replica_count: 1 });
        assert!(!repeat.changed_status());

        assert!(handle.lock().release(generation, offset, 16));
        assert_eq!(registry.info(&seg("s1")).unwrap().status, SegmentStatus::Removed);
    }

    #[test]
    fn force_unmount_blocks_remount_until_eviction_completes() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        registry.handle(&seg("s1")).unwrap().lock().allocate(8).unwrap();

        let outcome = registry.unmount(&seg("s1"), true).unwrap();
        let UnmountOutcome::Evicting {
            generation,
            replica_count: 1,
        } = outcome
        else {
            panic!("unexpected {outcome:?}");
        };
        assert_eq!(
            registry.info(&seg("s1")).unwrap().status,
            SegmentStatus::Draining
        );
        assert!(registry.candidates(1).is_empty());
        assert!(matches!(
            registry.mount(&seg("s1"), &node("n1"), 64),
            Err(MasterError::AlreadyMounted { .. })
        ));

        assert_eq!(registry.complete_eviction(&seg("s1"), generation), 1);
        assert!(registry.info(&seg("s1")).is_none());
        assert_eq!(registry.complete_eviction(&seg("s1"), generation), 0);
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
    }

    #[test]
    fn removed_records_are_dropped() {
        let registry = SegmentRegistry::new();
        for i in 0..1000 {
            let id = seg(&format!("s{i}"));
            registry.mount(&id, &node("n1"), 64).unwrap();
            registry.unmount(&id, false).unwrap();
        }
        assert!(registry.list().is_empty());
        assert!(matches!(
            registry.unmount(&seg("s0"), false),
            Err(MasterError::SegmentNotFound { .. })
        ));
    }

    #[test]
    fn retire_spares_newer_incarnation() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        let old_gen = registry.handle(&seg("s1")).unwrap().lock().generation;
        registry.unmount(&seg("s1"), false).unwrap();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();

        registry.retire(&seg("s1"), old_gen);
        assert_eq!(
            registry.info(&seg("s1")).unwrap().status,
            SegmentStatus::Active
        );
    }

    #[test]
    fn removed_segment_can_be_remounted_with_new_generation() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        let old_gen = registry.handle(&seg("s1")).unwrap().lock().generation;
        registry.unmount(&seg("s1"), false).unwrap();

        registry.mount(&seg("s1"), &node("n1"), 128).unwrap();
        let handle = registry.handle(&seg("s1")).unwrap();
        let mut s = handle.lock();
        assert_ne!(s.generation, old_gen);
        assert_eq!(s.free_bytes(), 128);

        let offset = s.allocate(8).unwrap();
        assert!(!s.release(old_gen, offset, 8));
        assert_eq!(s.free_bytes(), 120);
    }

    #[test]
    fn release_on_stale_range_is_rejected() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        let handle = registry.handle(&seg("s1")).unwrap();
        let mut s = handle.lock();
        let generation = s.generation;
        assert!(!s.release(generation, 0, 8));
        assert_eq!(s.free_bytes(), 64);
        assert_eq!(s.replica_count, 0);
    }

    #[test]
    fn owned_by_skips_removed() {
        let registry = SegmentRegistry::new();
        registry.mount(&seg("a"), &node("n1"), 8).unwrap();
        registry.mount(&seg("b"), &node("n1"), 8).unwrap();
        registry.mount(&seg("c"), &node("n2"), 8).unwrap();
        registry.unmount(&seg("b"), false).unwrap();

        assert_eq!(registry.owned_by(&node("n1")), vec![seg("a")]);
    }

    #[test]
    fn records_mirrored_to_store() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = SegmentRegistry::with_store(store.clone());

        registry.mount(&seg("s1"), &node("n1"), 64).unwrap();
        let doc = store.get("kvcache/segments/s1").unwrap().unwrap();
        assert_eq!(doc["capacity"], 64);
        assert_eq!(doc["owner"], "n1");

        registry.unmount(&seg("s1"), false).unwrap();
        assert_eq!(store.get("kvcache/segments/s1").unwrap(), None);
    }
}
