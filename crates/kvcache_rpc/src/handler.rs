//! Request dispatch.

use crate::messages::{Payload, Request, Response};
use kvcache_master::MasterService;
use std::sync::Arc;
use tracing::debug;

/// Maps decoded requests onto a [`MasterService`].
#[derive(Debug, Clone)]
pub struct RequestHandler {
    service: Arc<MasterService>,
}

impl RequestHandler {
    /// Creates a handler for `service`.
    pub fn new(service: Arc<MasterService>) -> Self {
        Self { service }
    }

    /// Returns the service requests are dispatched to.
    #[must_use]
    pub fn service(&self) -> &Arc<MasterService> {
        &self.service
    }

    /// Serves one request.
    pub fn handle(&self, request: Request) -> Response {
        debug!("handling {}", request.name());
        let master = &self.service;
        match request {
            Request::Ping => Response::Ok(Payload::Pong),
            Request::MountSegment {
                segment_id,
                owner,
                capacity,
            } => master.mount_segment(&segment_id, &owner, capacity).into(),
            Request::UnmountSegment { segment_id } => master.unmount_segment(&segment_id).into(),
            Request::GetSegment { segment_id } => master.get_segment(&segment_id).into(),
            Request::NodeUnreachable { node_id } => {
                Response::Ok(Payload::Count(master.node_unreachable(&node_id) as u64))
            }
            Request::PutStart {
                key,
                size,
                replica_count,
            } => master.put_start(&key, size, replica_count as usize).into(),
            Request::PutEnd { key } => master.put_end(&key).into(),
            Request::PutRevoke { key } => master.put_revoke(&key).into(),
            Request::Remove { key } => master.remove(&key).into(),
            Request::GetReplicaList { key } => master.get_replica_list(&key).into(),
            Request::ExistKey { key } => Response::Ok(Payload::Exists(master.exist_key(&key))),
            Request::RemoveAll => Response::Ok(Payload::Count(master.remove_all() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::WireError;
    use kvcache_master::{ErrorKind, MasterConfig, SegmentId};

    fn handler() -> RequestHandler {
        RequestHandler::new(Arc::new(MasterService::new(MasterConfig::default())))
    }

    fn mount(h: &RequestHandler, id: &str) {
        let response = h.handle(Request::MountSegment {
            segment_id: SegmentId::new(id),
            owner: "n1".into(),
            capacity: 1024,
        });
        assert_eq!(response, Response::Ok(Payload::Done));
    }

    #[test]
    fn ping() {
        assert_eq!(handler().handle(Request::Ping), Response::Ok(Payload::Pong));
    }

    #[test]
    fn put_flow() {
        let h = handler();
        mount(&h, "s1");

        let started = h.handle(Request::PutStart {
            key: "k".into(),
            size: 64,
            replica_count: 1,
        });
        let Response::Ok(Payload::Replicas(replicas)) = started else {
            panic!("unexpected {started:?}");
        };
        assert_eq!(
            h.handle(Request::ExistKey { key: "k".into() }),
            Response::Ok(Payload::Exists(false))
        );

        assert_eq!(
            h.handle(Request::PutEnd { key: "k".into() }),
            Response::Ok(Payload::Done)
        );
        assert_eq!(
            h.handle(Request::GetReplicaList { key: "k".into() }),
            Response::Ok(Payload::Replicas(replicas))
        );
        assert_eq!(h.handle(Request::RemoveAll), Response::Ok(Payload::Count(1)));
    }

    #[test]
    fn errors_carry_kind() {
        let h = handler();
        let response = h.handle(Request::PutEnd { key: "nope".into() });
        assert!(matches!(
            response,
            Response::Err(WireError {
                kind: ErrorKind::NotFound,
                ..
            })
        ));

        let response = h.handle(Request::PutStart {
            key: "k".into(),
            size: 8,
            replica_count: 1,
        });
        assert!(matches!(
            response,
            Response::Err(WireError {
                kind: ErrorKind::NoAvailableSegment,
                ..
            })
        ));
    }

    #[test]
    fn segment_requests() {
        let h = handler();
        mount(&h, "s1");
        let Response::Ok(Payload::Segment(info)) = h.handle(Request::GetSegment {
            segment_id: "s1".into(),
        }) else {
            panic!("expected segment");
        };
        assert_eq!(info.capacity, 1024);

        assert_eq!(
            h.handle(Request::NodeUnreachable {
                node_id: "n1".into()
            }),
            Response::Ok(Payload::Count(1))
        );
        assert!(matches!(
            h.handle(Request::UnmountSegment {
                segment_id: "s1".into()
            }),
            Response::Err(WireError {
                kind: ErrorKind::NotFound,
                ..
            })
        ));
    }
}
