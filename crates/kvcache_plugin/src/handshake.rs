//! Handshake capability for node discovery.

use crate::error::PluginResult;
use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

/// Callback invoked by a handshake daemon for every accepted peer.
///
/// Receives the peer's attribute document and returns the local one.
pub type OnReceive = Arc<dyn Fn(&Value) -> PluginResult<Value> + Send + Sync>;

/// An attribute-document exchange between two nodes.
///
/// One side runs a daemon via [`start_daemon`](Self::start_daemon); the other
/// calls [`send`](Self::send) with its own document and gets the daemon's
/// document back. Implementations decide the transport.
#[async_trait]
pub trait HandshakePlugin: Send + Sync {
    /// Starts accepting handshakes on `listen_port` (0 picks a free port).
    ///
    /// Returns the address the daemon is bound to. The daemon runs in the
    /// background until [`shutdown`](Self::shutdown) is called.
    async fn start_daemon(&self, on_receive: OnReceive, listen_port: u16)
        -> PluginResult<SocketAddr>;

    /// Connects to the daemon at `host:port`, sends `local` and returns the
    /// peer's attribute document.
    async fn send(&self, host: &str, port: u16, local: &Value) -> PluginResult<Value>;

    /// Stops every daemon started by this plugin.
    fn shutdown(&self);
}
