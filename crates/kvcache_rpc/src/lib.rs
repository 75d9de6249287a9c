//! # kvcache RPC
//!
//! Network surface of the kvcache master.
//!
//! This crate provides:
//! - [`Request`] / [`Response`] messages, one variant per master operation
//! - A length-prefixed CBOR frame codec
//! - [`MasterServer`] - a tokio TCP server dispatching to a
//!   [`MasterService`](kvcache_master::MasterService)
//! - [`MasterClient`] - an async client with one method per operation
//!
//! # Protocol
//!
//! A connection carries any number of request frames. The server answers
//! each with one response frame, in order. A response is either
//! `Ok(payload)` or `Err { kind, message }` where `kind` is the master's
//! [`ErrorKind`](kvcache_master::ErrorKind).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
pub mod codec;
mod config;
mod error;
mod handler;
mod messages;
mod server;

pub use client::MasterClient;
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{RpcError, RpcResult};
pub use handler::RequestHandler;
pub use messages::{Payload, Request, Response, WireError};
pub use server::MasterServer;
