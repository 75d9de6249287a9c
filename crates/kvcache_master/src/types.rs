//! Core type definitions for the kvcache master.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a memory segment contributed by a client node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Creates a new segment ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SegmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a client node that owns segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new node ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One physical copy of an object's bytes: a byte range inside a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replica {
    /// Segment holding the bytes.
    pub segment_id: SegmentId,
    /// Start of the range within the segment.
    pub offset: u64,
    /// Length of the range in bytes.
    pub length: u64,
}

impl Replica {
    /// Returns the exclusive end offset of the range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Returns true if the two ranges share a segment and overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Replica) -> bool {
        self.segment_id == other.segment_id
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

/// Lifecycle status of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentStatus {
    /// Accepting new allocations.
    Active,
    /// Unmount requested; no new allocations, waiting for replicas to go.
    Draining,
    /// Gone. Replicas that referenced it are invalid.
    Removed,
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegmentStatus::Active => "active",
            SegmentStatus::Draining => "draining",
            SegmentStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of an object record.
///
/// The `None` state of the protocol is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    /// Replicas reserved, payload being written by the client.
    PutInProgress,
    /// Payload committed and readable.
    Complete,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectState::PutInProgress => "put-in-progress",
            ObjectState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a segment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment identifier.
    pub segment_id: SegmentId,
    /// Node that contributed the segment.
    pub owner: NodeId,
    /// Capacity given at mount time.
    pub capacity: u64,
    /// Bytes not covered by any live replica.
    pub free_bytes: u64,
    /// Current lifecycle status.
    pub status: SegmentStatus,
    /// Number of live replicas allocated from the segment.
    pub replica_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(seg: &str, offset: u64, length: u64) -> Replica {
        Replica {
            segment_id: SegmentId::new(seg),
            offset,
            length,
        }
    }

    #[test]
    fn replica_overlap() {
        let a = replica("s1", 0, 100);
        assert!(a.overlaps(&replica("s1", 99, 10)));
        assert!(!a.overlaps(&replica("s1", 100, 10)));
        assert!(!a.overlaps(&replica("s2", 0, 100)));
    }

    #[test]
    fn ids_display_raw() {
        assert_eq!(SegmentId::from("seg-0").to_string(), "seg-0");
        assert_eq!(NodeId::from("node-a").as_str(), "node-a");
    }

    #[test]
    fn segment_id_serializes_as_string() {
        let json = serde_json::to_string(&SegmentId::new("s1")).unwrap();
        assert_eq!(json, "\"s1\"");
    }
}
