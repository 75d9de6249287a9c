//! Directory of client nodes learned through the handshake capability.
//!
//! A node announces itself by sending an attribute document containing at
//! least a `node_id` string. The directory answers with the master's own
//! document, remembers when each node was last heard from, and mirrors the
//! peer document to `kvcache/nodes/<node_id>` in the metadata store.
//!
//! Nodes that stay silent past a timeout are reported to the master as
//! unreachable, which removes the segments they own.

use crate::error::{MasterError, MasterResult};
use crate::service::{check_id, MasterService};
use crate::types::NodeId;
use kvcache_plugin::{MetadataStore, OnReceive, PluginError};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const NODE_KEY_PREFIX: &str = "kvcache/nodes/";

/// What the directory knows about one node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Attribute document from the node's latest handshake.
    pub attributes: Value,
    /// When the node was last heard from.
    pub last_seen: Instant,
}

/// Known client nodes and their liveness.
pub struct NodeDirectory {
    service: Arc<MasterService>,
    store: Option<Arc<dyn MetadataStore>>,
    local: Value,
    nodes: RwLock<BTreeMap<NodeId, NodeRecord>>,
}

impl NodeDirectory {
    /// Creates a directory answering handshakes with `local`.
    #[must_use]
    pub fn new(service: Arc<MasterService>, local: Value) -> Self {
        Self {
            service,
            store: None,
            local,
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mirrors node documents into `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Records a peer's handshake and returns the local document.
    ///
    /// # Errors
    ///
    /// [`MasterError::InvalidArgument`] if the document has no non-empty
    /// `node_id` string.
    pub fn on_handshake(&self, peer: &Value) -> MasterResult<Value> {
        self.on_handshake_at(peer, Instant::now())
    }

    /// Like [`on_handshake`](Self::on_handshake) with an explicit clock
    /// reading.
    ///
    /// # Errors
    ///
    /// As [`on_handshake`](Self::on_handshake).
    pub fn on_handshake_at(&self, peer: &Value, now: Instant) -> MasterResult<Value> {
        let node_id = peer
            .get("node_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(NodeId::new)
            .ok_or_else(|| MasterError::invalid_argument("handshake document lacks node_id"))?;
        check_id("node id", node_id.as_str())?;

        let known = self
            .nodes
            .write()
            .insert(
                node_id.clone(),
                NodeRecord {
                    attributes: peer.clone(),
                    last_seen: now,
                },
            )
            .is_some();
        if known {
            debug!("handshake refreshed node {}", node_id);
        } else {
            info!("node {} joined", node_id);
        }

        if let Some(store) = &self.store {
            let key = format!("{NODE_KEY_PREFIX}{node_id}");
            if let Err(e) = store.set(&key, peer) {
                warn!("failed to persist node {}: {}", node_id, e);
            }
        }
        Ok(self.local.clone())
    }

    /// Returns a handshake callback that feeds this directory.
    #[must_use]
    pub fn on_receive(self: &Arc<Self>) -> OnReceive {
        let directory = Arc::clone(self);
        Arc::new(move |peer: &Value| {
            directory
                .on_handshake(peer)
                .map_err(|e| PluginError::protocol(e.to_string()))
        })
    }

    /// Forgets `node` and removes the segments it owns. Returns the number
    /// of segments removed.
    pub fn mark_unreachable(&self, node: &NodeId) -> usize {
        let mut nodes = self.nodes.write();
        nodes.remove(node);
        self.evict(node)
    }

    /// Marks `node` unreachable only if it is still silent for longer than
    /// `ttl` at `now`. Returns the number of segments removed, or `None` if
    /// the node is unknown or was heard from since.
    ///
    /// The check and the eviction happen under the directory lock, so a
    /// handshake either lands first and keeps the node, or waits and
    /// registers it afresh.
    pub fn mark_unreachable_if_silent(
        &self,
        node: &NodeId,
        now: Instant,
        ttl: Duration,
    ) -> Option<usize> {
        let mut nodes = self.nodes.write();
        let silent = nodes
            .get(node)
            .is_some_and(|record| now.saturating_duration_since(record.last_seen) > ttl);
        if !silent {
            return None;
        }
        nodes.remove(node);
        warn!("node {} silent for more than {:?}", node, ttl);
        Some(self.evict(node))
    }

    /// Marks every node silent for longer than `ttl` at `now` as
    /// unreachable. Returns the nodes evicted.
    pub fn expire_silent(&self, now: Instant, ttl: Duration) -> Vec<NodeId> {
        let silent: Vec<NodeId> = self
            .nodes
            .read()
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_seen) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        silent
            .into_iter()
            .filter(|node| self.mark_unreachable_if_silent(node, now, ttl).is_some())
            .collect()
    }

    // Called with the node lock held.
    fn evict(&self, node: &NodeId) -> usize {
        if let Some(store) = &self.store {
            let key = format!("{NODE_KEY_PREFIX}{node}");
            if let Err(e) = store.remove(&key) {
                warn!("failed to remove node {}: {}", node, e);
            }
        }
        self.service.node_unreachable(node)
    }

    /// Returns the record of `node`.
    #[must_use]
    pub fn get(&self, node: &NodeId) -> Option<NodeRecord> {
        self.nodes.read().get(node).cloned()
    }

    /// Returns every known node id.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.nodes.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for NodeDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDirectory")
            .field("nodes", &self.nodes.read().len())
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}
