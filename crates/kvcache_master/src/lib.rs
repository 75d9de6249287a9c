//! # kvcache Master
//!
//! Metadata and placement authority of the kvcache distributed object cache.
//!
//! Client nodes contribute memory segments; the master tracks them, decides
//! where each replica of an object lives, and arbitrates the put lifecycle
//! so that no reader ever observes a partially written object. The master
//! never moves object bytes itself.
//!
//! This crate provides:
//! - [`SegmentRegistry`] - segment records, free extents and lifecycle
//! - [`Allocator`] - replica placement across distinct segments
//! - [`PutCoordinator`] - the `None -> PutInProgress -> Complete` protocol
//!   over a lock-striped [`ObjectTable`]
//! - [`MasterService`] - the facade every request goes through
//! - [`Reaper`] - reclamation of abandoned puts and drained segments
//! - [`NodeDirectory`] - nodes learned through the handshake capability
//!
//! ## Example
//!
//! ```rust
//! use kvcache_master::{MasterConfig, MasterService};
//!
//! let master = MasterService::new(MasterConfig::default());
//! master.mount_segment(&"seg-0".into(), &"node-a".into(), 1 << 20).unwrap();
//!
//! let replicas = master.put_start("obj1", 4096, 1).unwrap();
//! master.put_end("obj1").unwrap();
//! assert_eq!(master.get_replica_list("obj1").unwrap(), replicas);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod config;
mod directory;
mod error;
mod locks;
mod object;
mod reaper;
mod segment;
mod service;
mod stats;
mod types;

pub use allocator::{Allocation, Allocator};
pub use config::{ConflictPolicy, MasterConfig, UnmountPolicy};
pub use directory::{NodeDirectory, NodeRecord};
pub use error::{ErrorKind, MasterError, MasterResult};
pub use locks::Striped;
pub use object::{Invalidation, ObjectCounts, ObjectTable, PutCoordinator, StartedPut};
pub use reaper::{Reaper, SweepReport};
pub use segment::{MountOutcome, SegmentRegistry, UnmountOutcome};
pub use service::{MasterService, MAX_ID_LEN};
pub use stats::{MasterStats, StatsSnapshot};
pub use types::{NodeId, ObjectState, Replica, SegmentId, SegmentInfo, SegmentStatus};
