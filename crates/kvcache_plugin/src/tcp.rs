//! TCP handshake transport.
//!
//! Wire format: one length-delimited frame (4-byte big-endian length, then a
//! UTF-8 JSON document) in each direction per connection.

use crate::error::{PluginError, PluginResult};
use crate::handshake::{HandshakePlugin, OnReceive};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest attribute document accepted in either direction (1 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 1024 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_DOCUMENT_SIZE)
        .new_codec()
}

/// Handshake plugin exchanging JSON documents over TCP.
#[derive(Debug)]
pub struct TcpHandshake {
    bind_host: String,
    cancel: CancellationToken,
}

impl TcpHandshake {
    /// Creates a plugin whose daemons bind to `bind_host`.
    pub fn new(bind_host: impl Into<String>) -> Self {
        Self {
            bind_host: bind_host.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the host daemons bind to.
    #[must_use]
    pub fn bind_host(&self) -> &str {
        &self.bind_host
    }

    async fn serve_peer(stream: TcpStream, on_receive: OnReceive) -> PluginResult<()> {
        let mut framed = Framed::new(stream, codec());
        let frame = framed
            .next()
            .await
            .ok_or_else(|| PluginError::protocol("peer closed before sending attributes"))??;
        let peer: Value = serde_json::from_slice(&frame)?;
        let local = on_receive(&peer)?;
        framed.send(Bytes::from(serde_json::to_vec(&local)?)).await?;
        Ok(())
    }
}

impl Default for TcpHandshake {
    fn default() -> Self {
        Self::new("0.0.0.0")
    }
}

#[async_trait]
impl HandshakePlugin for TcpHandshake {
    async fn start_daemon(
        &self,
        on_receive: OnReceive,
        listen_port: u16,
    ) -> PluginResult<SocketAddr> {
        if self.cancel.is_cancelled() {
            return Err(PluginError::Closed);
        }

        let listener = TcpListener::bind((self.bind_host.as_str(), listen_port)).await?;
        let local_addr = listener.local_addr()?;
        info!("handshake daemon listening on {}", local_addr);

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer_addr)) => {
                                debug!("handshake from {}", peer_addr);
                                let on_receive = on_receive.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = Self::serve_peer(stream, on_receive).await {
                                        warn!("handshake with {} failed: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => warn!("handshake accept failed: {}", e),
                        }
                    }
                    _ = cancel.cancelled() => {
                        debug!("handshake daemon on {} stopped", local_addr);
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    async fn send(&self, host: &str, port: u16, local: &Value) -> PluginResult<Value> {
        let stream = TcpStream::connect((host, port)).await?;
        let mut framed = Framed::new(stream, codec());
        framed.send(Bytes::from(serde_json::to_vec(local)?)).await?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| PluginError::protocol("peer closed before replying"))??;
        Ok(serde_json::from_slice(&frame)?)
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}
