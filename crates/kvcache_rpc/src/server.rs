//! TCP server for the master.
//!
//! Each connection carries a sequence of request frames; the server answers
//! every request with exactly one response frame, in order. A frame that
//! does not decode closes the connection.

use crate::codec::{decode, encode, frame_codec};
use crate::config::ServerConfig;
use crate::error::RpcResult;
use crate::handler::RequestHandler;
use crate::messages::{Request, Response, WireError};
use futures::{SinkExt, StreamExt};
use kvcache_master::{ErrorKind, MasterService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A bound RPC server.
///
/// # Example
///
/// ```rust,ignore
/// use kvcache_master::{MasterConfig, MasterService};
/// use kvcache_rpc::{MasterServer, ServerConfig};
/// use std::sync::Arc;
///
/// let service = Arc::new(MasterService::new(MasterConfig::default()));
/// let server = MasterServer::bind(ServerConfig::default(), service).await?;
/// println!("listening on {}", server.local_addr()?);
/// server.serve(cancel).await?;
/// ```
pub struct MasterServer {
    config: ServerConfig,
    listener: TcpListener,
    handler: RequestHandler,
}

impl MasterServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// [`RpcError::Io`](crate::RpcError::Io) if the address cannot be bound.
    pub async fn bind(config: ServerConfig, service: Arc<MasterService>) -> RpcResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self {
            config,
            listener,
            handler: RequestHandler::new(service),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// [`RpcError::Io`](crate::RpcError::Io) if the socket has no address.
    pub fn local_addr(&self) -> RpcResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `cancel` fires.
    ///
    /// Connections beyond `max_connections` wait in the accept queue until a
    /// slot frees up.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener itself fails.
    pub async fn serve(self, cancel: CancellationToken) -> RpcResult<()> {
        let local_addr = self.local_addr()?;
        info!("master RPC listening on {}", local_addr);
        let slots = Arc::new(Semaphore::new(self.config.max_connections.max(1)));

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("connection from {}", peer_addr);
                    let handler = self.handler.clone();
                    let cancel = cancel.clone();
                    let max_frame_size = self.config.max_frame_size;
                    tokio::spawn(async move {
                        if let Err(e) =
                            serve_connection(stream, handler, max_frame_size, cancel).await
                        {
                            warn!("connection {} failed: {}", peer_addr, e);
                        }
                        drop(permit);
                        debug!("connection {} closed", peer_addr);
                    });
                }
                Err(e) => warn!("accept failed: {}", e),
            }
        }

        info!("master RPC on {} stopped", local_addr);
        Ok(())
    }
}

impl std::fmt::Debug for MasterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterServer")
            .field("config", &self.config)
            .field("local_addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: RequestHandler,
    max_frame_size: usize,
    cancel: CancellationToken,
) -> RpcResult<()> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, frame_codec(max_frame_size));

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = framed.next() => frame,
        };
        let Some(frame) = frame else {
            return Ok(());
        };

        let response = match decode::<Request>(&frame?) {
            Ok(request) => handler.handle(request),
            Err(e) => {
                let reply = Response::Err(WireError {
                    kind: ErrorKind::InvalidArgument,
                    message: e.to_string(),
                });
                framed.send(encode(&reply)?).await?;
                return Err(e);
            }
        };
        framed.send(encode(&response)?).await?;
    }
}
