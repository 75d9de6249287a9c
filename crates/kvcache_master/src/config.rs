//! Master configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What `put_start` does when the key already holds a complete object.
///
/// An in-flight put on the key is rejected under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail with `AlreadyExists`; the caller must remove first.
    #[default]
    Reject,
    /// Release the complete object's replicas and start a fresh put.
    Replace,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Replace => f.write_str("replace"),
        }
    }
}

/// What `unmount_segment` does with a segment that still holds replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmountPolicy {
    /// Stop allocating from the segment and remove it once its last replica
    /// is released.
    #[default]
    Drain,
    /// Remove the segment now and drop every replica placed on it.
    Force,
}

impl FromStr for UnmountPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "force" => Ok(Self::Force),
            other => Err(format!("unknown unmount policy: {other}")),
        }
    }
}

impl fmt::Display for UnmountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drain => f.write_str("drain"),
            Self::Force => f.write_str("force"),
        }
    }
}

/// Configuration for the master state machine.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// How long a put may stay uncommitted before the reaper reclaims it.
    pub put_lease_ttl: Duration,

    /// Whether the reaper runs.
    pub enable_gc: bool,

    /// Period between reaper sweeps.
    pub gc_interval: Duration,

    /// Nodes silent for longer than this are treated as unreachable by the
    /// reaper (`None` = never).
    pub node_ttl: Option<Duration>,

    /// Behavior of `put_start` on a key holding a complete object.
    pub conflict_policy: ConflictPolicy,

    /// Behavior of `unmount_segment` on a segment with live replicas.
    pub unmount_policy: UnmountPolicy,

    /// Number of lock stripes in the object table (rounded up to a power of
    /// two).
    pub object_shards: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            put_lease_ttl: Duration::from_secs(30),
            enable_gc: false,
            gc_interval: Duration::from_secs(1),
            node_ttl: None,
            conflict_policy: ConflictPolicy::Reject,
            unmount_policy: UnmountPolicy::Drain,
            object_shards: 64,
        }
    }
}

impl MasterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the put lease TTL.
    #[must_use]
    pub const fn put_lease_ttl(mut self, ttl: Duration) -> Self {
        self.put_lease_ttl = ttl;
        self
    }

    /// Enables or disables the reaper.
    #[must_use]
    pub const fn enable_gc(mut self, value: bool) -> Self {
        self.enable_gc = value;
        self
    }

    /// Sets the reaper period.
    #[must_use]
    pub const fn gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Sets the node liveness timeout.
    #[must_use]
    pub const fn node_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.node_ttl = ttl;
        self
    }

    /// Sets the put conflict policy.
    #[must_use]
    pub const fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the unmount policy.
    #[must_use]
    pub const fn unmount_policy(mut self, policy: UnmountPolicy) -> Self {
        self.unmount_policy = policy;
        self
    }

    /// Sets the number of object table stripes.
    #[must_use]
    pub const fn object_shards(mut self, shards: usize) -> Self {
        self.object_shards = shards;
        self
    }
}
