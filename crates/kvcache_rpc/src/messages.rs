//! Request and response messages.

use kvcache_master::{ErrorKind, MasterError, NodeId, Replica, SegmentId, SegmentInfo};
use serde::{Deserialize, Serialize};

/// A request to the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check.
    Ping,
    /// Register a segment contributed by `owner`.
    MountSegment {
        /// Segment to register.
        segment_id: SegmentId,
        /// Node contributing it.
        owner: NodeId,
        /// Capacity in bytes.
        capacity: u64,
    },
    /// Take a segment out of service.
    UnmountSegment {
        /// Segment to unmount.
        segment_id: SegmentId,
    },
    /// Fetch a segment snapshot.
    GetSegment {
        /// Segment to describe.
        segment_id: SegmentId,
    },
    /// Report that a node can no longer be reached.
    NodeUnreachable {
        /// The lost node.
        node_id: NodeId,
    },
    /// Reserve replicas for a new object.
    PutStart {
        /// Object key.
        key: String,
        /// Object size in bytes.
        size: u64,
        /// Number of distinct replicas.
        replica_count: u32,
    },
    /// Commit a put.
    PutEnd {
        /// Object key.
        key: String,
    },
    /// Abandon a put.
    PutRevoke {
        /// Object key.
        key: String,
    },
    /// Delete an object.
    Remove {
        /// Object key.
        key: String,
    },
    /// Look up the replicas of a complete object.
    GetReplicaList {
        /// Object key.
        key: String,
    },
    /// Test whether a complete object exists.
    ExistKey {
        /// Object key.
        key: String,
    },
    /// Delete every complete object.
    RemoveAll,
}

impl Request {
    /// Returns the operation name, for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::MountSegment { .. } => "MountSegment",
            Request::UnmountSegment { .. } => "UnmountSegment",
            Request::GetSegment { .. } => "GetSegment",
            Request::NodeUnreachable { .. } => "NodeUnreachable",
            Request::PutStart { .. } => "PutStart",
            Request::PutEnd { .. } => "PutEnd",
            Request::PutRevoke { .. } => "PutRevoke",
            Request::Remove { .. } => "Remove",
            Request::GetReplicaList { .. } => "GetReplicaList",
            Request::ExistKey { .. } => "ExistKey",
            Request::RemoveAll => "RemoveAll",
        }
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Answer to [`Request::Ping`].
    Pong,
    /// The operation succeeded and returns nothing.
    Done,
    /// Replica placements.
    Replicas(Vec<Replica>),
    /// Answer to [`Request::ExistKey`].
    Exists(bool),
    /// Number of objects or segments affected.
    Count(u64),
    /// A segment snapshot.
    Segment(SegmentInfo),
}

/// Body of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Error taxonomy.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl From<&MasterError> for WireError {
    fn from(err: &MasterError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A response from the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The request succeeded.
    Ok(Payload),
    /// The request was rejected.
    Err(WireError),
}

impl<T: Into<Payload>> From<Result<T, MasterError>> for Response {
    fn from(result: Result<T, MasterError>) -> Self {
        match result {
            Ok(value) => Response::Ok(value.into()),
            Err(e) => Response::Err(WireError::from(&e)),
        }
    }
}

impl From<()> for Payload {
    fn from((): ()) -> Self {
        Payload::Done
    }
}

impl From<Vec<Replica>> for Payload {
    fn from(replicas: Vec<Replica>) -> Self {
        Payload::Replicas(replicas)
    }
}

impl From<SegmentInfo> for Payload {
    fn from(info: SegmentInfo) -> Self {
        Payload::Segment(info)
    }
}
