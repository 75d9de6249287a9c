//! Error types for the RPC layer.

use kvcache_master::ErrorKind;
use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur sending or serving RPCs.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The master rejected the request.
    #[error("{kind}: {message}")]
    Remote {
        /// Error taxonomy of the rejection.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// The master answered with a payload of the wrong shape.
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    /// The connection closed before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// Returns the master's error kind if this is a remote rejection.
    #[must_use]
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            RpcError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if the failure happened below the protocol, so the
    /// request may not have reached the master.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, RpcError::Io(_) | RpcError::ConnectionClosed)
    }
}
