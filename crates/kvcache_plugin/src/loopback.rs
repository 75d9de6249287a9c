//! In-process handshake transport for tests.

use crate::error::{PluginError, PluginResult};
use crate::handshake::{HandshakePlugin, OnReceive};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

const FIRST_EPHEMERAL_PORT: u16 = 40000;

#[derive(Default)]
struct Network {
    daemons: HashMap<u16, OnReceive>,
    next_port: u16,
}

/// Handshake plugin that exchanges documents through a shared in-process
/// table instead of sockets.
///
/// Clones share the same table, so a daemon started on one clone is
/// reachable from every other clone. The host argument of
/// [`send`](HandshakePlugin::send) is ignored.
#[derive(Clone, Default)]
pub struct LoopbackHandshake {
    network: Arc<Mutex<Network>>,
}

impl LoopbackHandshake {
    /// Creates a new, empty loopback network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of running daemons.
    #[must_use]
    pub fn daemon_count(&self) -> usize {
        self.network.lock().daemons.len()
    }
}

impl std::fmt::Debug for LoopbackHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHandshake")
            .field("daemons", &self.daemon_count())
            .finish()
    }
}

#[async_trait]
impl HandshakePlugin for LoopbackHandshake {
    async fn start_daemon(
        &self,
        on_receive: OnReceive,
        listen_port: u16,
    ) -> PluginResult<SocketAddr> {
        let mut network = self.network.lock();
        let port = if listen_port == 0 {
            let mut candidate = network.next_port.max(FIRST_EPHEMERAL_PORT);
            while network.daemons.contains_key(&candidate) {
                candidate = candidate.wrapping_add(1).max(FIRST_EPHEMERAL_PORT);
            }
            network.next_port = candidate.wrapping_add(1);
            candidate
        } else {
            listen_port
        };

        if network.daemons.contains_key(&port) {
            return Err(PluginError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("loopback port {port} already has a daemon"),
            )));
        }
        network.daemons.insert(port, on_receive);
        Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    async fn send(&self, host: &str, port: u16, local: &Value) -> PluginResult<Value> {
        let on_receive = self
            .network
            .lock()
            .daemons
            .get(&port)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(format!("{host}:{port}")))?;
        on_receive(local)
    }

    fn shutdown(&self) {
        self.network.lock().daemons.clear();
    }
}
