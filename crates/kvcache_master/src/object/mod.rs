//! Object records and the put protocol.

mod coordinator;
mod table;

pub use coordinator::{Invalidation, PutCoordinator, StartedPut};
pub use table::{ObjectCounts, ObjectTable};
