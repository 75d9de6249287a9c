//! Background reclamation.
//!
//! Each sweep revokes puts whose lease has passed, removes Draining segments
//! left without replicas, and, when a node directory and a node timeout are
//! configured, treats silent nodes as unreachable. The sweep only calls
//! public [`MasterService`] operations, so it takes the same locks in the
//! same order as any client request.

use crate::directory::NodeDirectory;
use crate::service::MasterService;
use crate::types::{NodeId, SegmentId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one sweep reclaimed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys of abandoned puts that were revoked.
    pub reclaimed_puts: Vec<String>,
    /// Drained segments promoted to Removed.
    pub removed_segments: Vec<SegmentId>,
    /// Nodes declared unreachable.
    pub unreachable_nodes: Vec<NodeId>,
}

impl SweepReport {
    /// Returns true if the sweep changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reclaimed_puts.is_empty()
            && self.removed_segments.is_empty()
            && self.unreachable_nodes.is_empty()
    }
}

/// Periodic garbage collector for a [`MasterService`].
#[derive(Debug, Clone)]
pub struct Reaper {
    service: Arc<MasterService>,
    interval: Duration,
    liveness: Option<(Arc<NodeDirectory>, Duration)>,
}

impl Reaper {
    /// Creates a reaper using the service's configured interval and node
    /// timeout.
    #[must_use]
    pub fn new(service: Arc<MasterService>) -> Self {
        let interval = service.config().gc_interval;
        Self {
            service,
            interval,
            liveness: None,
        }
    }

    /// Also expires nodes of `directory` silent past the configured node
    /// timeout. Has no effect if no timeout is configured.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<NodeDirectory>) -> Self {
        self.liveness = self
            .service
            .config()
            .node_ttl
            .map(|ttl| (directory, ttl));
        self
    }

    /// Runs one sweep at the current time.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Runs one sweep as of `now`.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        if let Some((directory, ttl)) = &self.liveness {
            report.unreachable_nodes = directory.expire_silent(now, *ttl);
        }

        for key in self.service.expired_puts(now) {
            if self.service.reclaim_expired_put(&key, now) {
                report.reclaimed_puts.push(key);
            }
        }

        for segment_id in self.service.drained_segments() {
            match self.service.finalize_drained_segment(&segment_id) {
                Ok(true) => report.removed_segments.push(segment_id),
                Ok(false) => {}
                Err(e) => warn!("failed to finalize segment {}: {}", segment_id, e),
            }
        }

        if !report.is_empty() {
            debug!(
                "sweep reclaimed {} puts, {} segments, {} nodes",
                report.reclaimed_puts.len(),
                report.removed_segments.len(),
                report.unreachable_nodes.len()
            );
        }
        report
    }

    /// Sweeps every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("reaper started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
        info!("reaper stopped");
    }

    /// Spawns [`run`](Self::run) on the current tokio runtime.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterConfig;
    use serde_json::json;

    fn service(config: MasterConfig) -> Arc<MasterService> {
        let service = Arc::new(MasterService::new(config));
        service
            .mount_segment(&"s1".into(), &"n1".into(), 1024)
            .unwrap();
        service
    }

    #[test]
    fn sweep_reclaims_expired_puts_only() {
        let service = service(MasterConfig::default().put_lease_ttl(Duration::from_secs(5)));
        let start = Instant::now();
        service.put_start_at("old", 100, 1, start).unwrap();
        service
            .put_start_at("fresh", 100, 1, start + Duration::from_secs(4))
            .unwrap();
        service.put_start_at("done", 100, 1, start).unwrap();
        service.put_end("done").unwrap();

        let reaper = Reaper::new(Arc::clone(&service));
        let report = reaper.sweep_at(start + Duration::from_secs(6));
        assert_eq!(report.reclaimed_puts, vec!["old".to_string()]);
        assert!(service.exist_key("done"));
        assert_eq!(service.get_segment(&"s1".into()).unwrap().free_bytes, 824);

        assert!(reaper.sweep_at(start + Duration::from_secs(6)).is_empty());
    }

    #[test]
    fn sweep_reports_nothing_on_idle_master() {
        let reaper = Reaper::new(service(MasterConfig::default()));
        assert!(reaper.sweep().is_empty());
    }

    #[test]
    fn sweep_expires_silent_nodes() {
        let service = service(MasterConfig::default().node_ttl(Some(Duration::from_secs(3))));
        let directory = Arc::new(NodeDirectory::new(Arc::clone(&service), json!({})));
        let start = Instant::now();
        directory
            .on_handshake_at(&json!({"node_id": "n1"}), start)
            .unwrap();

        let reaper = Reaper::new(Arc::clone(&service)).with_directory(directory);
        assert!(reaper.sweep_at(start + Duration::from_secs(1)).is_empty());

        let report = reaper.sweep_at(start + Duration::from_secs(10));
        assert_eq!(report.unreachable_nodes, vec![NodeId::new("n1")]);
        assert!(service.segments().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let service = service(
            MasterConfig::default()
                .put_lease_ttl(Duration::from_millis(10))
                .gc_interval(Duration::from_millis(20)),
        );
        service.put_start("k", 10, 1).unwrap();

        let cancel = CancellationToken::new();
        let handle = Reaper::new(Arc::clone(&service)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(service.object_counts().total(), 0);
    }
}
