//! Controller-facing request/response shapes.
//!
//! Plain structs standing in for whatever network framing a real controller
//! RPC layer would use; framing itself is out of scope (see DESIGN.md).

use std::collections::HashMap;

use crate::error::ErrorCode;
use crate::types::{BrokerId, ControllerEpoch, LeaderEpoch, PartitionId, ZkVersion};

/// Key identifying one partition in a batch request/response: (topic, index).
pub type PartitionKey = (String, PartitionId);

/// Host/port a leader broker can be reached at, carried alongside a
/// `LeaderAndIsrRequest` so followers know where to point their fetchers.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub broker_id: BrokerId,
    pub host: String,
    pub port: u16,
}

/// The controller's view of a single partition's leadership and ISR,
/// carried inside a `LeaderAndIsrRequest`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionStateInfo {
    pub replication_factor: u8,
    pub assigned_replicas: Vec<BrokerId>,
    pub leader: BrokerId,
    pub leader_epoch: LeaderEpoch,
    pub isr: Vec<BrokerId>,
    pub zk_version: ZkVersion,
    pub controller_epoch: ControllerEpoch,
}

/// `LeaderAndIsr` request: the controller's authoritative leadership
/// assignment for a batch of partitions.
#[derive(Debug, Clone)]
pub struct LeaderAndIsrRequest {
    pub controller_id: BrokerId,
    pub controller_epoch: ControllerEpoch,
    pub correlation_id: u64,
    pub partition_states: HashMap<PartitionKey, PartitionStateInfo>,
    pub leaders: Vec<BrokerEndpoint>,
}

#[derive(Debug, Clone, Default)]
pub struct LeaderAndIsrResponse {
    pub error: ErrorCode,
    pub partition_errors: HashMap<PartitionKey, ErrorCode>,
}

/// `StopReplica` request: stop (optionally delete) the listed partitions.
#[derive(Debug, Clone)]
pub struct StopReplicaRequest {
    pub controller_id: BrokerId,
    pub controller_epoch: ControllerEpoch,
    pub correlation_id: u64,
    pub delete_partitions: bool,
    pub partitions: Vec<PartitionKey>,
}

#[derive(Debug, Clone, Default)]
pub struct StopReplicaResponse {
    pub error: ErrorCode,
    pub partition_errors: HashMap<PartitionKey, ErrorCode>,
}
