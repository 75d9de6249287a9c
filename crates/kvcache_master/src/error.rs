//! Error types for the kvcache master.

use crate::types::{ObjectState, SegmentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for master operations.
pub type MasterResult<T> = Result<T, MasterError>;

/// Errors returned by master operations.
///
/// Every rejected operation maps to a distinct [`ErrorKind`] so that callers
/// can decide whether to retry, abort, or treat the failure as a protocol
/// violation. The master never retries on the caller's behalf.
#[derive(Debug, Error)]
pub enum MasterError {
    /// No object record for the key.
    #[error("object not found: {key}")]
    ObjectNotFound {
        /// The key that was looked up.
        key: String,
    },

    /// Segment unknown or already removed.
    #[error("segment not found: {segment_id}")]
    SegmentNotFound {
        /// The segment that was looked up.
        segment_id: SegmentId,
    },

    /// A put conflicts with an existing record for the key.
    #[error("object already exists: {key} ({state})")]
    AlreadyExists {
        /// The contested key.
        key: String,
        /// State of the record that blocked the put.
        state: ObjectState,
    },

    /// The operation is not valid in the object's current state.
    #[error("{operation} not allowed on {key} in state {state}")]
    InvalidState {
        /// The key operated on.
        key: String,
        /// Current state of the record.
        state: ObjectState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Not enough distinct active segments with room for the reservation.
    #[error("no available segment for {replica_count} replica(s) of {size} bytes")]
    NoAvailableSegment {
        /// Requested replica size.
        size: u64,
        /// Requested number of distinct replicas.
        replica_count: usize,
    },

    /// Segment id already mounted with different parameters.
    #[error("segment already mounted: {segment_id}")]
    AlreadyMounted {
        /// The colliding segment id.
        segment_id: SegmentId,
    },

    /// Request arguments failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A metadata or handshake plugin failed.
    #[error("plugin error: {0}")]
    Plugin(#[from] kvcache_plugin::PluginError),
}

impl MasterError {
    /// Creates an object-not-found error.
    pub fn object_not_found(key: impl Into<String>) -> Self {
        Self::ObjectNotFound { key: key.into() }
    }

    /// Creates a segment-not-found error.
    pub fn segment_not_found(segment_id: &SegmentId) -> Self {
        Self::SegmentNotFound {
            segment_id: segment_id.clone(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns the caller-facing kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            MasterError::ObjectNotFound { .. } | MasterError::SegmentNotFound { .. } => {
                ErrorKind::NotFound
            }
            MasterError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            MasterError::InvalidState { .. } => ErrorKind::InvalidState,
            MasterError::NoAvailableSegment { .. } => ErrorKind::NoAvailableSegment,
            MasterError::AlreadyMounted { .. } => ErrorKind::AlreadyMounted,
            MasterError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            MasterError::Plugin(_) => ErrorKind::Internal,
        }
    }
}

/// Caller-facing error taxonomy, stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Key or segment unknown or already removed.
    NotFound,
    /// Conflicting put on an occupied key.
    AlreadyExists,
    /// Operation not valid in the current lifecycle state.
    InvalidState,
    /// The allocator could not satisfy a reservation.
    NoAvailableSegment,
    /// Segment id collision on mount with differing parameters.
    AlreadyMounted,
    /// Malformed request.
    InvalidArgument,
    /// Failure inside the master unrelated to the request.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
