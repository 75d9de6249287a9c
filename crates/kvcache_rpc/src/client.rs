//! Async client for the master.

use crate::codec::{decode, encode, frame_codec, MAX_FRAME_SIZE};
use crate::error::{RpcError, RpcResult};
use crate::messages::{Payload, Request, Response};
use futures::{SinkExt, StreamExt};
use kvcache_master::{NodeId, Replica, SegmentId, SegmentInfo};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// A connection to the master.
///
/// Requests are sent one at a time; each call waits for its response.
#[derive(Debug)]
pub struct MasterClient {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl MasterClient {
    /// Connects to the master at `addr`.
    ///
    /// # Errors
    ///
    /// [`RpcError::Io`] if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> RpcResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: Framed::new(stream, frame_codec(MAX_FRAME_SIZE)),
        })
    }

    /// Sends `request` and returns the successful payload.
    ///
    /// # Errors
    ///
    /// [`RpcError::Remote`] if the master rejected the request, or a
    /// transport or codec error.
    pub async fn call(&mut self, request: &Request) -> RpcResult<Payload> {
        self.framed.send(encode(request)?).await?;
        let frame = self
            .framed
            .next()
            .await
            .ok_or(RpcError::ConnectionClosed)??;
        match decode::<Response>(&frame)? {
            Response::Ok(payload) => Ok(payload),
            Response::Err(e) => Err(RpcError::Remote {
                kind: e.kind,
                message: e.message,
            }),
        }
    }

    async fn call_done(&mut self, request: Request) -> RpcResult<()> {
        let name = request.name();
        match self.call(&request).await? {
            Payload::Done => Ok(()),
            _ => Err(RpcError::UnexpectedResponse(name)),
        }
    }

    async fn call_replicas(&mut self, request: Request) -> RpcResult<Vec<Replica>> {
        let name = request.name();
        match self.call(&request).await? {
            Payload::Replicas(replicas) => Ok(replicas),
            _ => Err(RpcError::UnexpectedResponse(name)),
        }
    }

    async fn call_count(&mut self, request: Request) -> RpcResult<u64> {
        let name = request.name();
        match self.call(&request).await? {
            Payload::Count(count) => Ok(count),
            _ => Err(RpcError::UnexpectedResponse(name)),
        }
    }

    /// Checks that the master is serving.
    pub async fn ping(&mut self) -> RpcResult<()> {
        match self.call(&Request::Ping).await? {
            Payload::Pong => Ok(()),
            _ => Err(RpcError::UnexpectedResponse("Ping")),
        }
    }

    /// Registers a segment.
    pub async fn mount_segment(
        &mut self,
        segment_id: &SegmentId,
        owner: &NodeId,
        capacity: u64,
    ) -> RpcResult<()> {
        self.call_done(Request::MountSegment {
            segment_id: segment_id.clone(),
            owner: owner.clone(),
            capacity,
        })
        .await
    }

    /// Takes a segment out of service.
    pub async fn unmount_segment(&mut self, segment_id: &SegmentId) -> RpcResult<()> {
        self.call_done(Request::UnmountSegment {
            segment_id: segment_id.clone(),
        })
        .await
    }

    /// Fetches a segment snapshot.
    pub async fn get_segment(&mut self, segment_id: &SegmentId) -> RpcResult<SegmentInfo> {
        let request = Request::GetSegment {
            segment_id: segment_id.clone(),
        };
        match self.call(&request).await? {
            Payload::Segment(info) => Ok(info),
            _ => Err(RpcError::UnexpectedResponse("GetSegment")),
        }
    }

    /// Reports an unreachable node. Returns the number of segments removed.
    pub async fn node_unreachable(&mut self, node_id: &NodeId) -> RpcResult<u64> {
        self.call_count(Request::NodeUnreachable {
            node_id: node_id.clone(),
        })
        .await
    }

    /// Reserves replicas for a new object.
    pub async fn put_start(
        &mut self,
        key: &str,
        size: u64,
        replica_count: u32,
    ) -> RpcResult<Vec<Replica>> {
        self.call_replicas(Request::PutStart {
            key: key.to_string(),
            size,
            replica_count,
        })
        .await
    }

    /// Commits a put.
    pub async fn put_end(&mut self, key: &str) -> RpcResult<()> {
        self.call_done(Request::PutEnd {
            key: key.to_string(),
        })
        .await
    }

    /// Abandons a put.
    pub async fn put_revoke(&mut self, key: &str) -> RpcResult<()> {
        self.call_done(Request::PutRevoke {
            key: key.to_string(),
        })
        .await
    }

    /// Deletes an object.
    pub async fn remove(&mut self, key: &str) -> RpcResult<()> {
        self.call_done(Request::Remove {
            key: key.to_string(),
        })
        .await
    }

    /// Looks up the replicas of a complete object.
    pub async fn get_replica_list(&mut self, key: &str) -> RpcResult<Vec<Replica>> {
        self.call_replicas(Request::GetReplicaList {
            key: key.to_string(),
        })
        .await
    }

    /// Tests whether a complete object exists.
    pub async fn exist_key(&mut self, key: &str) -> RpcResult<bool> {
        let request = Request::ExistKey {
            key: key.to_string(),
        };
        match self.call(&request).await? {
            Payload::Exists(exists) => Ok(exists),
            _ => Err(RpcError::UnexpectedResponse("ExistKey")),
        }
    }

    /// Deletes every complete object. Returns the number deleted.
    pub async fn remove_all(&mut self) -> RpcResult<u64> {
        self.call_count(Request::RemoveAll).await
    }
}
