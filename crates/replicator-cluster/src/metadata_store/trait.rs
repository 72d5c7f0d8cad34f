//! Generic path-keyed, versioned-payload metadata store contract.
//!
//! One trait serves both the leader/ISR record persisted per partition and
//! any other coordinator-owned metadata keyed by a string path, mirroring
//! a CAS-shaped external store (ZooKeeper, etcd, a consensus KV) without
//! committing to any one of them.

use crate::ClusterError;
use crate::types::{BrokerId, ControllerEpoch, LeaderEpoch, PartitionId, ZkVersion};
use serde::{Deserialize, Serialize};

/// The document stored at a partition's metadata path: who leads it, under
/// which leader epoch, who is in its ISR, and which controller epoch wrote
/// the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderIsrRecord {
    pub leader: BrokerId,
    pub leader_epoch: LeaderEpoch,
    pub isr: Vec<BrokerId>,
    pub controller_epoch: ControllerEpoch,
}

/// Canonical metadata-store path for a partition's leader/ISR record.
pub fn partition_path(topic: &str, partition: PartitionId) -> String {
    format!("/partitions/{topic}/{}", partition.as_u32())
}

/// CAS-shaped contract a coordinator uses to persist and read leader/ISR
/// state. Implementations need not be distributed: [`crate::metadata_store::memory::InMemoryMetadataStore`]
/// and [`crate::metadata_store::file::FileMetadataStore`] both satisfy it
/// locally, but callers must treat every operation as if it incurred
/// network I/O: no operation may be assumed to complete synchronously
/// without the possibility of failure.
pub trait MetadataStore: Send + Sync {
    /// Atomically replace the record at `path` if its current version
    /// equals `expected_version`. Returns `(true, new_version)` on success,
    /// `(false, current_version)` if the precondition failed; the caller
    /// is expected to re-read and retry at a higher level, never inside
    /// this call.
    fn conditional_update(
        &self,
        path: &str,
        payload: &LeaderIsrRecord,
        expected_version: ZkVersion,
    ) -> Result<(bool, ZkVersion), ClusterError>;

    /// Create the record at `path`. Fails with [`ClusterError::InvalidManifest`]-style
    /// context if a record already exists there.
    fn conditional_create(
        &self,
        path: &str,
        payload: &LeaderIsrRecord,
    ) -> Result<ZkVersion, ClusterError>;

    /// Read the record at `path`, if any, along with its version.
    fn read(&self, path: &str) -> Result<Option<(LeaderIsrRecord, ZkVersion)>, ClusterError>;
}
