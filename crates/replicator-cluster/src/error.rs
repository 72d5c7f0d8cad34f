//! Error types for the replication coordinator.

use std::fmt;

/// The protocol-level error codes a coordinator returns to the controller
/// in `LeaderAndIsrResponse`/`StopReplicaResponse` partition results. These
/// travel over the wire as part of the response payload, not as a Rust
/// `Error`: a partition-level `NotLeaderForPartition` is an ordinary
/// outcome, not a failure of the request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    NoError,
    NotLeaderForPartition,
    UnknownTopicOrPartition,
    ReplicaNotAvailable,
    StaleControllerEpoch,
    StaleLeaderEpoch,
    NotAssignedReplica,
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::NoError
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NoError => "NoError",
            ErrorCode::NotLeaderForPartition => "NotLeaderForPartition",
            ErrorCode::UnknownTopicOrPartition => "UnknownTopicOrPartition",
            ErrorCode::ReplicaNotAvailable => "ReplicaNotAvailable",
            ErrorCode::StaleControllerEpoch => "StaleControllerEpoch",
            ErrorCode::StaleLeaderEpoch => "StaleLeaderEpoch",
            ErrorCode::NotAssignedReplica => "NotAssignedReplica",
        };
        f.write_str(s)
    }
}

/// Main error type for cluster coordination operations: manifest loading,
/// metadata-store access, and partition/coordinator bookkeeping that fails
/// outside the normal per-partition error-code channel (e.g. a metadata
/// store I/O failure, not a stale epoch).
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    BrokerNotFound {
        broker_id: u32,
    },
    TopicNotFound {
        topic: String,
    },
    PartitionNotFound {
        topic: String,
        partition_id: u32,
    },
    /// Invalid manifest structure or data.
    InvalidManifest {
        context: String,
        reason: String,
    },
    /// Manifest file I/O error.
    ManifestIo {
        context: String,
        reason: String,
    },
    /// Metadata store access failed (I/O, serialization, or CAS conflict
    /// exhaustion, not an ordinary expected-version mismatch).
    MetadataStore {
        context: String,
        reason: String,
    },
    /// Invalid leader epoch (must be monotonically increasing).
    InvalidEpoch {
        topic: String,
        partition_id: u32,
        current_epoch: i64,
        new_epoch: i64,
    },
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::BrokerNotFound { broker_id } => {
                write!(f, "Broker with ID {broker_id} not found")
            }
            ClusterError::TopicNotFound { topic } => {
                write!(f, "Topic '{topic}' not found")
            }
            ClusterError::PartitionNotFound { topic, partition_id } => {
                write!(f, "Partition {partition_id} not found for topic '{topic}'")
            }
            ClusterError::InvalidManifest { context, reason } => {
                write!(f, "Invalid manifest in {context}: {reason}")
            }
            ClusterError::ManifestIo { context, reason } => {
                write!(f, "Manifest I/O error in {context}: {reason}")
            }
            ClusterError::MetadataStore { context, reason } => {
                write!(f, "Metadata store error in {context}: {reason}")
            }
            ClusterError::InvalidEpoch {
                topic,
                partition_id,
                current_epoch,
                new_epoch,
            } => {
                write!(
                    f,
                    "Invalid epoch for topic '{topic}' partition {partition_id}: \
                     attempted {new_epoch}, current {current_epoch} (epochs must increase)"
                )
            }
        }
    }
}

impl std::error::Error for ClusterError {}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
                | ClusterError::InvalidManifest { .. }
                | ClusterError::InvalidEpoch { .. }
        )
    }

    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        ClusterError::ManifestIo {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_parse_error(e: impl std::fmt::Display, context: &str) -> Self {
        ClusterError::InvalidManifest {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_metadata_store_error(e: impl std::fmt::Display, context: &str) -> Self {
        ClusterError::MetadataStore {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}
