//! The master facade.

use crate::allocator::Allocator;
use crate::config::{MasterConfig, UnmountPolicy};
use crate::error::{MasterError, MasterResult};
use crate::object::{ObjectCounts, PutCoordinator};
use crate::segment::{MountOutcome, SegmentRegistry, UnmountOutcome};
use crate::stats::{MasterStats, StatsSnapshot};
use crate::types::{NodeId, ObjectState, Replica, SegmentId, SegmentInfo, SegmentStatus};
use kvcache_plugin::MetadataStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The master service.
///
/// `MasterService` is the single entry point for every operation the master
/// serves. It owns the segment registry, the allocator and the object table,
/// validates arguments, and maps each request onto them. It is `Send + Sync`
/// and meant to be shared behind an [`Arc`] by the RPC server and the reaper.
///
/// ```rust,ignore
/// use kvcache_master::{MasterConfig, MasterService};
///
/// let master = MasterService::new(MasterConfig::default());
/// master.mount_segment(&"seg-0".into(), &"node-a".into(), 1 << 30)?;
///
/// let replicas = master.put_start("obj1", 4096, 1)?;
/// // ... client writes the payload into `replicas` ...
/// master.put_end("obj1")?;
/// assert_eq!(master.get_replica_list("obj1")?, replicas);
/// ```
pub struct MasterService {
    config: MasterConfig,
    registry: Arc<SegmentRegistry>,
    coordinator: PutCoordinator,
    stats: MasterStats,
}

impl MasterService {
    /// Creates a master with no metadata store.
    #[must_use]
    pub fn new(config: MasterConfig) -> Self {
        Self::with_registry(config, SegmentRegistry::new())
    }

    /// Creates a master that mirrors segment records into `store`.
    #[must_use]
    pub fn with_metadata_store(config: MasterConfig, store: Arc<dyn MetadataStore>) -> Self {
        Self::with_registry(config, SegmentRegistry::with_store(store))
    }

    fn with_registry(config: MasterConfig, registry: SegmentRegistry) -> Self {
        let registry = Arc::new(registry);
        let coordinator = PutCoordinator::new(
            Allocator::new(Arc::clone(&registry)),
            config.object_shards,
            config.put_lease_ttl,
            config.conflict_policy,
        );
        Self {
            config,
            registry,
            coordinator,
            stats: MasterStats::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    // === Segments ===

    /// Registers a segment contributed by `owner`.
    ///
    /// Re-mounting an identical Active segment succeeds without adding
    /// capacity.
    ///
    /// # Errors
    ///
    /// [`MasterError::InvalidArgument`] for empty or overlong ids or zero
    /// capacity,
    /// [`MasterError::AlreadyMounted`] if the id is live with other
    /// parameters.
    pub fn mount_segment(
        &self,
        segment_id: &SegmentId,
        owner: &NodeId,
        capacity: u64,
    ) -> MasterResult<()> {
        let result = check_id("segment id", segment_id.as_str())
            .and_then(|()| check_id("node id", owner.as_str()))
            .and_then(|()| self.registry.mount(segment_id, owner, capacity));
        if let MountOutcome::Mounted = self.track(result)? {
            self.stats.record_mount();
        }
        Ok(())
    }

    /// Takes a segment out of service according to the unmount policy.
    ///
    /// # Errors
    ///
    /// [`MasterError::SegmentNotFound`] if the segment is unknown or already
    /// removed.
    pub fn unmount_segment(&self, segment_id: &SegmentId) -> MasterResult<()> {
        let force = self.config.unmount_policy == UnmountPolicy::Force;
        let result = self.unmount(segment_id, force);
        self.track(result)
    }

    fn unmount(&self, segment_id: &SegmentId, force: bool) -> MasterResult<()> {
        check_id("segment id", segment_id.as_str())?;
        let outcome = self.registry.unmount(segment_id, force)?;
        if outcome.changed_status() {
            self.stats.record_unmount();
        }
        if let UnmountOutcome::Evicting { generation, .. } = outcome {
            // The segment stays Draining until every replica is gone, so no
            // reader sees a replica on a Removed segment.
            let invalidated = self.coordinator.invalidate_segment(segment_id, generation);
            self.registry.complete_eviction(segment_id, generation);
            info!(
                "segment {} force-removed: {} puts revoked, {} objects dropped, {} replicas dropped",
                segment_id,
                invalidated.revoked_puts,
                invalidated.dropped_objects,
                invalidated.dropped_replicas
            );
        }
        Ok(())
    }

    /// Removes every live segment owned by a node that can no longer be
    /// reached.
    ///
    /// The node's memory is gone, so its segments are removed immediately and
    /// replicas on them are dropped regardless of the unmount policy. Returns
    /// the number of segments removed.
    pub fn node_unreachable(&self, node: &NodeId) -> usize {
        let mut removed = 0;
        for segment_id in self.registry.owned_by(node) {
            match self.unmount(&segment_id, true) {
                Ok(()) => removed += 1,
                // Raced with another unmount.
                Err(MasterError::SegmentNotFound { .. }) => {}
                Err(e) => warn!("failed to unmount {} of node {}: {}", segment_id, node, e),
            }
        }
        if removed > 0 {
            warn!("node {} unreachable, removed {} segments", node, removed);
        }
        removed
    }

    /// Returns a snapshot of a live segment.
    ///
    /// # Errors
    ///
    /// [`MasterError::SegmentNotFound`] if the segment is unknown or removed.
    pub fn get_segment(&self, segment_id: &SegmentId) -> MasterResult<SegmentInfo> {
        self.registry
            .info(segment_id)
            .filter(|info| info.status != SegmentStatus::Removed)
            .ok_or_else(|| MasterError::segment_not_found(segment_id))
    }

    /// Returns snapshots of every live segment, ordered by id.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.registry
            .list()
            .into_iter()
            .filter(|info| info.status != SegmentStatus::Removed)
            .collect()
    }

    /// Returns Draining segments with no replicas left.
    #[must_use]
    pub fn drained_segments(&self) -> Vec<SegmentId> {
        self.registry.drained()
    }

    /// Promotes a drained segment to Removed. Returns false if it is not
    /// Draining or still holds replicas.
    ///
    /// # Errors
    ///
    /// [`MasterError::SegmentNotFound`] if the segment was never mounted.
    pub fn finalize_drained_segment(&self, segment_id: &SegmentId) -> MasterResult<bool> {
        let result = self.registry.finalize_drained(segment_id);
        self.track(result)
    }

    // === Objects ===

    /// Reserves replicas for a new object and records the put as in
    /// progress.
    ///
    /// # Errors
    ///
    /// - [`MasterError::InvalidArgument`] for an empty key, zero size or zero
    ///   replica count
    /// - [`MasterError::AlreadyExists`] if the key is occupied
    /// - [`MasterError::NoAvailableSegment`] if the replicas cannot be placed
    ///
    /// A complete object deleted under the replace policy counts as a remove.
    pub fn put_start(
        &self,
        key: &str,
        size: u64,
        replica_count: usize,
    ) -> MasterResult<Vec<Replica>> {
        self.put_start_at(key, size, replica_count, Instant::now())
    }

    /// Like [`put_start`](Self::put_start) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// As [`put_start`](Self::put_start).
    pub fn put_start_at(
        &self,
        key: &str,
        size: u64,
        replica_count: usize,
        now: Instant,
    ) -> MasterResult<Vec<Replica>> {
        let result = check_key(key)
            .and_then(|()| self.coordinator.put_start(key, size, replica_count, now));
        let started = self.track(result)?;
        self.stats.record_put_start();
        if started.replaced {
            self.stats.record_removes(1);
        }
        Ok(started.replicas)
    }

    /// Commits a put.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] or [`MasterError::InvalidState`].
    pub fn put_end(&self, key: &str) -> MasterResult<()> {
        let result = self.coordinator.put_end(key);
        self.track(result)?;
        self.stats.record_put_end();
        Ok(())
    }

    /// Abandons a put and releases its replicas.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] or [`MasterError::InvalidState`].
    pub fn put_revoke(&self, key: &str) -> MasterResult<()> {
        let result = self.coordinator.put_revoke(key);
        self.track(result)?;
        self.stats.record_put_revoke();
        Ok(())
    }

    /// Deletes an object. An in-flight put is revoked.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] if the key has no record.
    pub fn remove(&self, key: &str) -> MasterResult<()> {
        let result = self.coordinator.remove(key);
        match self.track(result)? {
            ObjectState::Complete => self.stats.record_removes(1),
            ObjectState::PutInProgress => self.stats.record_put_revoke(),
        }
        Ok(())
    }

    /// Returns the replicas of a complete object.
    ///
    /// # Errors
    ///
    /// [`MasterError::ObjectNotFound`] if the key has no complete object.
    pub fn get_replica_list(&self, key: &str) -> MasterResult<Vec<Replica>> {
        let result = self.coordinator.get_replica_list(key);
        let replicas = self.track(result)?;
        self.stats.record_replica_lookup();
        Ok(replicas)
    }

    /// Returns true if `key` holds a complete object.
    #[must_use]
    pub fn exist_key(&self, key: &str) -> bool {
        self.coordinator.exist_key(key)
    }

    /// Deletes every complete object, leaving in-flight puts alone. Returns
    /// the number deleted.
    pub fn remove_all(&self) -> usize {
        let removed = self.coordinator.remove_all();
        self.stats.record_removes(removed as u64);
        info!("removed all {} complete objects", removed);
        removed
    }

    /// Returns keys whose put lease has passed at `now`.
    #[must_use]
    pub fn expired_puts(&self, now: Instant) -> Vec<String> {
        self.coordinator.table().expired_puts(now)
    }

    /// Revokes `key` if it is still in flight and its lease passed at `now`.
    pub fn reclaim_expired_put(&self, key: &str, now: Instant) -> bool {
        let reclaimed = self.coordinator.reclaim_expired(key, now);
        if reclaimed {
            self.stats.record_put_reclaimed();
            warn!("reclaimed abandoned put {}", key);
        }
        reclaimed
    }

    /// Returns object record counts by state.
    #[must_use]
    pub fn object_counts(&self) -> ObjectCounts {
        self.coordinator.table().counts()
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn track<T>(&self, result: MasterResult<T>) -> MasterResult<T> {
        if let Err(e) = &result {
            if let MasterError::NoAvailableSegment { .. } = e {
                self.stats.record_no_space();
            }
            self.stats.record_error();
            debug!("request rejected: {}", e);
        }
        result
    }
}

impl std::fmt::Debug for MasterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterService")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Longest segment or node id accepted, in bytes.
///
/// Ids name metadata files, and a percent-encoded id of this length still
/// fits a 255-byte file name.
pub const MAX_ID_LEN: usize = 64;

pub(crate) fn check_id(what: &str, value: &str) -> MasterResult<()> {
    if value.is_empty() {
        return Err(MasterError::invalid_argument(format!("{what} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(MasterError::invalid_argument(format!(
            "{what} longer than {MAX_ID_LEN} bytes"
        )));
    }
    Ok(())
}

fn check_key(key: &str) -> MasterResult<()> {
    if key.is_empty() {
        return Err(MasterError::invalid_argument("key must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictPolicy;
    use kvcache_plugin::InMemoryMetadataStore;

    fn master(config: MasterConfig) -> MasterService {
        let master = MasterService::new(config);
        master
            .mount_segment(&"s1".into(), &"n1".into(), 1024)
            .unwrap();
        master
    }

    #[test]
    fn empty_arguments_rejected() {
        let m = master(MasterConfig::default());
        assert!(matches!(
            m.put_start("", 10, 1),
            Err(MasterError::InvalidArgument { .. })
        ));
        assert!(matches!(
            m.put_start("k", 0, 1),
            Err(MasterError::InvalidArgument { .. })
        ));
        assert!(matches!(
            m.mount_segment(&"".into(), &"n1".into(), 10),
            Err(MasterError::InvalidArgument { .. })
        ));
        assert_eq!(m.stats().errors, 3);
    }

    #[test]
    fn overlong_ids_rejected() {
        let m = master(MasterConfig::default());
        let long = "s".repeat(MAX_ID_LEN + 1);
        assert!(matches!(
            m.mount_segment(&long.as_str().into(), &"n1".into(), 10),
            Err(MasterError::InvalidArgument { .. })
        ));
        assert!(matches!(
            m.mount_segment(&"s2".into(), &long.as_str().into(), 10),
            Err(MasterError::InvalidArgument { .. })
        ));
        let longest = "s".repeat(MAX_ID_LEN);
        m.mount_segment(&longest.as_str().into(), &"n1".into(), 10)
            .unwrap();
        m.put_start(&"k".repeat(1024), 10, 1).unwrap();
    }

    #[test]
    fn longest_id_persists_to_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(kvcache_plugin::FileMetadataStore::open(dir.path()).unwrap());
        let m = MasterService::with_metadata_store(MasterConfig::default(), store.clone());
        let id = "/".repeat(MAX_ID_LEN);
        m.mount_segment(&id.as_str().into(), &"n1".into(), 64).unwrap();
        assert_eq!(
            store.keys("kvcache/segments/").unwrap(),
            vec![format!("kvcache/segments/{id}")]
        );
    }

    #[test]
    fn get_segment_hides_removed() {
        let m = master(MasterConfig::default());
        assert_eq!(m.get_segment(&"s1".into()).unwrap().free_bytes, 1024);
        m.unmount_segment(&"s1".into()).unwrap();
        assert!(matches!(
            m.get_segment(&"s1".into()),
            Err(MasterError::SegmentNotFound { .. })
        ));
        assert!(m.segments().is_empty());
    }

    #[test]
    fn drain_keeps_objects_readable() {
        let m = master(MasterConfig::default());
        m.put_start("k", 100, 1).unwrap();
        m.put_end("k").unwrap();

        m.unmount_segment(&"s1".into()).unwrap();
        assert_eq!(
            m.get_segment(&"s1".into()).unwrap().status,
            SegmentStatus::Draining
        );
        assert_eq!(m.get_replica_list("k").unwrap().len(), 1);
        assert!(matches!(
            m.put_start("other", 10, 1),
            Err(MasterError::NoAvailableSegment { .. })
        ));

        m.remove("k").unwrap();
        assert!(m.get_segment(&"s1".into()).is_err());
    }

    #[test]
    fn force_unmount_drops_objects() {
        let m = master(MasterConfig::default().unmount_policy(UnmountPolicy::Force));
        m.put_start("k", 100, 1).unwrap();
        m.put_end("k").unwrap();
        m.put_start("pending", 100, 1).unwrap();

        m.unmount_segment(&"s1".into()).unwrap();
        assert!(!m.exist_key("k"));
        assert_eq!(m.object_counts().total(), 0);
        assert!(m.segments().is_empty());

        // The id is free again once the eviction finished.
        m.mount_segment(&"s1".into(), &"n1".into(), 1024).unwrap();
        assert_eq!(m.get_segment(&"s1".into()).unwrap().free_bytes, 1024);
        assert_eq!(m.stats().segments_unmounted, 1);
    }

    #[test]
    fn repeat_unmount_counted_once() {
        let m = master(MasterConfig::default());
        m.put_start("k", 100, 1).unwrap();
        m.put_end("k").unwrap();

        m.unmount_segment(&"s1".into()).unwrap();
        m.unmount_segment(&"s1".into()).unwrap();
        assert_eq!(m.stats().segments_unmounted, 1);
        assert_eq!(
            m.get_segment(&"s1".into()).unwrap().status,
            SegmentStatus::Draining
        );
    }

    #[test]
    fn unreachable_node_loses_its_segments() {
        let m = master(MasterConfig::default());
        m.mount_segment(&"s2".into(), &"n2".into(), 1024).unwrap();
        m.put_start("k", 100, 2).unwrap();
        m.put_end("k").unwrap();

        assert_eq!(m.node_unreachable(&"n1".into()), 1);
        let replicas = m.get_replica_list("k").unwrap();
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].segment_id, SegmentId::new("s2"));
        assert_eq!(m.node_unreachable(&"n1".into()), 0);
    }

    #[test]
    fn replace_policy_applies() {
        let m = master(MasterConfig::default().conflict_policy(ConflictPolicy::Replace));
        m.put_start("k", 100, 1).unwrap();
        m.put_end("k").unwrap();
        m.put_start("k", 200, 1).unwrap();
        assert_eq!(m.get_segment(&"s1".into()).unwrap().free_bytes, 824);
        assert_eq!(m.stats().removes, 1);
    }

    #[test]
    fn stats_follow_operations() {
        let m = master(MasterConfig::default());
        m.put_start("a", 10, 1).unwrap();
        m.put_end("a").unwrap();
        m.get_replica_list("a").unwrap();
        m.put_start("b", 10, 1).unwrap();
        m.remove("b").unwrap();
        let _ = m.put_start("c", 10, 5);

        let stats = m.stats();
        assert_eq!(stats.puts_started, 2);
        assert_eq!(stats.puts_completed, 1);
        assert_eq!(stats.puts_revoked, 1);
        assert_eq!(stats.replica_lookups, 1);
        assert_eq!(stats.no_space_rejections, 1);
        assert_eq!(stats.segments_mounted, 1);
    }

    #[test]
    fn metadata_store_tracks_segments() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let m = MasterService::with_metadata_store(MasterConfig::default(), store.clone());
        m.mount_segment(&"s1".into(), &"n1".into(), 64).unwrap();
        assert_eq!(store.keys("kvcache/segments/").unwrap().len(), 1);

        m.unmount_segment(&"s1".into()).unwrap();
        assert!(store.keys("kvcache/segments/").unwrap().is_empty());
    }
}
