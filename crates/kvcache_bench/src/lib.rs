//! Benchmark utilities.

use kvcache_master::{MasterConfig, MasterService, NodeId, SegmentId};
use std::sync::Arc;

/// Capacity of each segment mounted by [`mounted_service`].
pub const SEGMENT_CAPACITY: u64 = 1 << 40;

/// Builds a master with `segments` large segments, one per node.
///
/// # Panics
///
/// Panics if a mount is rejected.
pub fn mounted_service(segments: usize) -> Arc<MasterService> {
    let service = Arc::new(MasterService::new(MasterConfig::default()));
    for i in 0..segments {
        service
            .mount_segment(
                &SegmentId::new(format!("seg-{i}")),
                &NodeId::new(format!("node-{i}")),
                SEGMENT_CAPACITY,
            )
            .unwrap();
    }
    service
}

/// Generates `count` distinct object keys.
pub fn keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("object/{i:08}")).collect()
}
