//! Core identifiers shared across the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a broker in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerId(pub u32);

/// Index of a partition within a topic, unique together with the topic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

/// Monotonically increasing counter bumped by the controller on every
/// leadership change for a partition; used to reject commands issued under
/// a leadership decision that has since been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaderEpoch(pub i64);

/// Monotonically increasing counter for the cluster's controller; fences
/// out messages sent by a controller that has since been deposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerEpoch(pub i64);

/// Opaque metadata-store version tag used to CAS the persisted leader/ISR
/// record; callers never construct one, only echo back one they previously
/// read from [`crate::metadata_store::MetadataStore::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkVersion(pub i64);

impl PartitionId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl LeaderEpoch {
    pub const UNINITIALIZED: LeaderEpoch = LeaderEpoch(-1);

    pub fn next(self) -> Self {
        LeaderEpoch(self.0 + 1)
    }
}

impl From<u32> for BrokerId {
    fn from(id: u32) -> Self {
        BrokerId(id)
    }
}

impl From<BrokerId> for u32 {
    fn from(broker_id: BrokerId) -> Self {
        broker_id.0
    }
}

impl From<u32> for PartitionId {
    fn from(index: u32) -> Self {
        PartitionId(index)
    }
}

impl From<PartitionId> for u32 {
    fn from(partition_id: PartitionId) -> Self {
        partition_id.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker-{}", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LeaderEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leader-epoch-{}", self.0)
    }
}

impl fmt::Display for ControllerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "controller-epoch-{}", self.0)
    }
}
