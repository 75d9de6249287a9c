//! Error types for plugin operations.

use std::io;
use thiserror::Error;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur in metadata storage or handshake plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored or exchanged document was not valid JSON.
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// The handshake peer is not listening.
    #[error("no handshake peer at {0}")]
    NotFound(String),

    /// The connection string names a backend this build does not provide.
    #[error("unsupported connection scheme: {0}")]
    UnsupportedScheme(String),

    /// The connection string could not be parsed.
    #[error("invalid connection string {conn}: {reason}")]
    InvalidConnString {
        /// The offending connection string.
        conn: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The peer violated the exchange protocol.
    #[error("handshake protocol error: {0}")]
    Protocol(String),

    /// The plugin has been shut down.
    #[error("plugin is closed")]
    Closed,
}

impl PluginError {
    /// Creates an invalid connection string error.
    pub fn invalid_conn(conn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConnString {
            conn: conn.into(),
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
