//! # kvcache Plugin
//!
//! Capability interfaces the kvcache master depends on but does not own.
//!
//! This crate provides two swappable capabilities, each selected at startup
//! from a connection string:
//!
//! - [`MetadataStore`] - a key/value store for JSON documents the master wants
//!   to externalize beyond process memory (`get`, `set`, `remove`)
//! - [`HandshakePlugin`] - a node-discovery exchange: a listener that answers
//!   a peer's attribute document with the local one, and a client call that
//!   performs the same exchange against a remote peer
//!
//! ## Available Implementations
//!
//! - [`InMemoryMetadataStore`] - For testing and single-process deployments
//! - [`FileMetadataStore`] - One JSON file per key under a directory
//! - [`TcpHandshake`] - Length-delimited JSON over TCP
//! - [`LoopbackHandshake`] - In-process exchange for tests
//!
//! ## Example
//!
//! ```rust
//! use kvcache_plugin::{connect, MetadataStore};
//! use serde_json::json;
//!
//! let store = connect::metadata_store("memory://").unwrap();
//! store.set("nodes/a", &json!({"rpc_port": 50051})).unwrap();
//! assert_eq!(store.get("nodes/a").unwrap(), Some(json!({"rpc_port": 50051})));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod connect;
mod error;
mod file;
mod handshake;
mod loopback;
mod memory;
mod metadata;
mod tcp;

pub use error::{PluginError, PluginResult};
pub use file::FileMetadataStore;
pub use handshake::{HandshakePlugin, OnReceive};
pub use loopback::LoopbackHandshake;
pub use memory::InMemoryMetadataStore;
pub use metadata::MetadataStore;
pub use tcp::{TcpHandshake, MAX_DOCUMENT_SIZE};
