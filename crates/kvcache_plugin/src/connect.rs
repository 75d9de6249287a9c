//! Selects plugin implementations from connection strings.
//!
//! | Capability | Connection string | Implementation |
//! |------------|-------------------|----------------|
//! | metadata | `memory://` | [`InMemoryMetadataStore`] |
//! | metadata | `file:///var/lib/kvcache` | [`FileMetadataStore`] |
//! | handshake | `tcp://` or `tcp://0.0.0.0` | [`TcpHandshake`] |
//! | handshake | `loopback://` | [`LoopbackHandshake`] |

use crate::error::{PluginError, PluginResult};
use crate::file::FileMetadataStore;
use crate::handshake::HandshakePlugin;
use crate::loopback::LoopbackHandshake;
use crate::memory::InMemoryMetadataStore;
use crate::metadata::MetadataStore;
use crate::tcp::TcpHandshake;
use std::path::Path;
use std::sync::Arc;

/// Splits `scheme://rest`; a bare word is treated as a scheme with no rest.
fn split_scheme(conn: &str) -> PluginResult<(&str, &str)> {
    let conn = conn.trim();
    if conn.is_empty() {
        return Err(PluginError::invalid_conn(conn, "empty connection string"));
    }
    Ok(match conn.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => (conn, ""),
    })
}

/// Opens the metadata store named by `conn`.
///
/// # Errors
///
/// Returns [`PluginError::UnsupportedScheme`] for unknown schemes and
/// [`PluginError::InvalidConnString`] for a `file` scheme without a path.
pub fn metadata_store(conn: &str) -> PluginResult<Arc<dyn MetadataStore>> {
    let (scheme, rest) = split_scheme(conn)?;
    match scheme.to_ascii_lowercase().as_str() {
        "memory" | "mem" => Ok(Arc::new(InMemoryMetadataStore::new())),
        "file" => {
            if rest.is_empty() {
                return Err(PluginError::invalid_conn(conn, "missing directory path"));
            }
            Ok(Arc::new(FileMetadataStore::open(Path::new(rest))?))
        }
        other => Err(PluginError::UnsupportedScheme(other.to_string())),
    }
}

/// Creates the handshake plugin named by `conn`.
///
/// # Errors
///
/// Returns [`PluginError::UnsupportedScheme`] for unknown schemes.
pub fn handshake(conn: &str) -> PluginResult<Arc<dyn HandshakePlugin>> {
    let (scheme, rest) = split_scheme(conn)?;
    match scheme.to_ascii_lowercase().as_str() {
        "tcp" => {
            let host = rest.trim_end_matches('/');
            if host.contains(':') && !host.starts_with('[') {
                return Err(PluginError::invalid_conn(
                    conn,
                    "handshake port is configured separately; give a bind host only",
                ));
            }
            if host.is_empty() {
                Ok(Arc::new(TcpHandshake::default()))
            } else {
                Ok(Arc::new(TcpHandshake::new(host)))
            }
        }
        "loopback" => Ok(Arc::new(LoopbackHandshake::new())),
        other => Err(PluginError::UnsupportedScheme(other.to_string())),
    }
}
