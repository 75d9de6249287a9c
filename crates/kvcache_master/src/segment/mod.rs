//! Segment registry.
//!
//! Tracks every memory segment contributed by client nodes: identity,
//! capacity, free space, owner and lifecycle status.
//!
//! ## Lifecycle
//!
//! ```text
//! mount -> Active --unmount--> Draining --last replica released--> Removed
//!                 \--unmount (no replicas)------------------------>/
//! ```
//!
//! A forced unmount also goes through Draining while the master drops the
//! segment's replicas from their objects. Removed records are dropped from
//! the registry, so the id can be mounted again.

mod extent;
mod registry;

pub use registry::{MountOutcome, SegmentRegistry, UnmountOutcome};
