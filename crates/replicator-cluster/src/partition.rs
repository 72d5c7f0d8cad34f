//! Partition state machine: leader/follower lifecycle, ISR maintenance, and
//! HW advancement.
//!
//! Each `Partition` owns a single `parking_lot::Mutex` covering every
//! mutating operation, including the metadata-store CAS inside
//! [`Partition::update_isr`]: concurrent ISR shrink and
//! expand attempts never interleave.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use replicator_storage::{HwCheckpointStore, LogManager, StorageError};

use crate::error::{ClusterError, ErrorCode};
use crate::metadata_store::r#trait::{LeaderIsrRecord, partition_path};
use crate::metadata_store::MetadataStore;
use crate::replica::Replica;
use crate::requests::PartitionStateInfo;
use crate::types::{BrokerId, ControllerEpoch, LeaderEpoch, PartitionId, ZkVersion};

/// Error surface for partition operations: a protocol-level code destined
/// for the per-partition response slot, or an underlying failure from the
/// metadata store / log that the coordinator should log and translate.
#[derive(Debug)]
pub enum PartitionOpError {
    Protocol(ErrorCode),
    Cluster(ClusterError),
    Storage(StorageError),
}

impl fmt::Display for PartitionOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionOpError::Protocol(code) => write!(f, "protocol error: {code}"),
            PartitionOpError::Cluster(err) => write!(f, "{err}"),
            PartitionOpError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PartitionOpError {}

impl From<ClusterError> for PartitionOpError {
    fn from(err: ClusterError) -> Self {
        PartitionOpError::Cluster(err)
    }
}

impl From<StorageError> for PartitionOpError {
    fn from(err: StorageError) -> Self {
        PartitionOpError::Storage(err)
    }
}

/// Outcome of a `make_follower` call that did not hit a hard error but
/// still failed to apply: the designated leader broker was not present in
/// the accompanying leader set, so nothing was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOpOutcome {
    Applied,
    LeaderBrokerNotFound,
}

struct PartitionState {
    assigned_replicas: HashMap<BrokerId, Replica>,
    in_sync_replicas: Vec<BrokerId>,
    leader_replica_id: Option<BrokerId>,
    leader_epoch: LeaderEpoch,
    controller_epoch: ControllerEpoch,
    zk_version: ZkVersion,
}

impl PartitionState {
    fn new() -> Self {
        Self {
            assigned_replicas: HashMap::new(),
            in_sync_replicas: Vec::new(),
            leader_replica_id: None,
            leader_epoch: LeaderEpoch::UNINITIALIZED,
            controller_epoch: ControllerEpoch(0),
            zk_version: ZkVersion(0),
        }
    }
}

/// One topic-partition's leader/follower state machine, as hosted on this
/// broker.
pub struct Partition {
    topic: String,
    partition_id: PartitionId,
    local_broker_id: BrokerId,
    log_manager: Arc<dyn LogManager>,
    metadata_store: Arc<dyn MetadataStore>,
    checkpoint_store: Arc<HwCheckpointStore>,
    state: parking_lot::Mutex<PartitionState>,
}

impl Partition {
    pub fn new(
        topic: String,
        partition_id: PartitionId,
        local_broker_id: BrokerId,
        log_manager: Arc<dyn LogManager>,
        metadata_store: Arc<dyn MetadataStore>,
        checkpoint_store: Arc<HwCheckpointStore>,
    ) -> Self {
        Self {
            topic,
            partition_id,
            local_broker_id,
            log_manager,
            metadata_store,
            checkpoint_store,
            state: parking_lot::Mutex::new(PartitionState::new()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn leader_epoch(&self) -> LeaderEpoch {
        self.state.lock().leader_epoch
    }

    pub fn controller_epoch(&self) -> ControllerEpoch {
        self.state.lock().controller_epoch
    }

    pub fn is_leader_locally(&self) -> bool {
        self.state.lock().leader_replica_id == Some(self.local_broker_id)
    }

    pub fn in_sync_replicas(&self) -> Vec<BrokerId> {
        self.state.lock().in_sync_replicas.clone()
    }

    /// The local replica's HW, if this broker hosts one for this partition.
    pub fn local_high_watermark(&self) -> Option<i64> {
        match self.state.lock().assigned_replicas.get(&self.local_broker_id) {
            Some(Replica::Local { high_watermark, .. }) => Some(*high_watermark),
            _ => None,
        }
    }

    pub fn local_log_end_offset(&self) -> Option<i64> {
        match self.state.lock().assigned_replicas.get(&self.local_broker_id) {
            Some(Replica::Local { leo, .. }) => Some(*leo),
            _ => None,
        }
    }

    /// For the local broker, opens (or creates) the log and clamps the
    /// initial HW to `min(checkpointed_hw, log_end_offset)`.
    pub fn get_or_create_replica(&self, broker_id: BrokerId) -> Result<(), PartitionOpError> {
        let mut state = self.state.lock();
        self.get_or_create_replica_locked(&mut state, broker_id)
    }

    fn get_or_create_replica_locked(
        &self,
        state: &mut PartitionState,
        broker_id: BrokerId,
    ) -> Result<(), PartitionOpError> {
        if state.assigned_replicas.contains_key(&broker_id) {
            return Ok(());
        }

        let replica = if broker_id == self.local_broker_id {
            let log = self
                .log_manager
                .get_or_create(&self.topic, self.partition_id.as_u32() as i32)?;
            let checkpointed_hw = self
                .checkpoint_store
                .read()?
                .get(&(self.topic.clone(), self.partition_id.as_u32() as i32))
                .copied()
                .unwrap_or(0);
            let leo = log.log_end_offset();
            Replica::new_local(broker_id, log, checkpointed_hw.min(leo), leo)
        } else {
            Replica::new_remote(broker_id)
        };

        state.assigned_replicas.insert(broker_id, replica);
        Ok(())
    }

    fn sync_assigned_replicas_locked(
        &self,
        state: &mut PartitionState,
        assigned_replicas: &[BrokerId],
    ) -> Result<(), PartitionOpError> {
        for &id in assigned_replicas {
            self.get_or_create_replica_locked(state, id)?;
        }
        let keep: HashSet<BrokerId> = assigned_replicas.iter().copied().collect();
        state.assigned_replicas.retain(|id, _| keep.contains(id));
        Ok(())
    }

    pub fn make_leader(
        &self,
        controller_epoch: ControllerEpoch,
        state_info: &PartitionStateInfo,
    ) -> Result<(), PartitionOpError> {
        let mut state = self.state.lock();
        state.controller_epoch = controller_epoch;
        self.sync_assigned_replicas_locked(&mut state, &state_info.assigned_replicas)?;

        let local_broker_id = self.local_broker_id;
        for (&id, replica) in state.assigned_replicas.iter_mut() {
            if id != local_broker_id {
                replica.reset_leo_to_unknown();
            }
        }

        state.in_sync_replicas = state_info.isr.clone();
        state.leader_epoch = state_info.leader_epoch;
        state.leader_replica_id = Some(local_broker_id);

        self.seed_or_adopt_isr_record_locked(&mut state)?;

        maybe_increment_leader_hw_locked(&mut state, local_broker_id);
        Ok(())
    }

    /// Ensures the metadata store holds a leader/ISR record at this
    /// partition's path and that `state.zk_version` matches it, before any
    /// `update_isr_locked` CAS is attempted against that path. A partition
    /// becoming leader for the first time has no record yet, so one is
    /// created from the in-memory state just assembled; a partition
    /// reclaiming leadership in a later term adopts whatever version is
    /// already stored rather than trusting a controller-supplied guess.
    fn seed_or_adopt_isr_record_locked(&self, state: &mut PartitionState) -> Result<(), PartitionOpError> {
        let path = partition_path(&self.topic, self.partition_id);
        match self.metadata_store.read(&path)? {
            Some((_, version)) => {
                state.zk_version = version;
            }
            None => {
                let record = LeaderIsrRecord {
                    leader: state.leader_replica_id.expect("leader_replica_id set by make_leader"),
                    leader_epoch: state.leader_epoch,
                    isr: state.in_sync_replicas.clone(),
                    controller_epoch: state.controller_epoch,
                };
                state.zk_version = self.metadata_store.conditional_create(&path, &record)?;
            }
        }
        Ok(())
    }

    pub fn make_follower(
        &self,
        controller_epoch: ControllerEpoch,
        state_info: &PartitionStateInfo,
        leader_brokers: &[BrokerId],
    ) -> Result<PartitionOpOutcome, PartitionOpError> {
        if !leader_brokers.contains(&state_info.leader) {
            warn!(
                "make_follower for {}/{}: designated leader {} is not in the leader broker set",
                self.topic, self.partition_id, state_info.leader
            );
            return Ok(PartitionOpOutcome::LeaderBrokerNotFound);
        }

        let mut state = self.state.lock();
        state.controller_epoch = controller_epoch;
        self.sync_assigned_replicas_locked(&mut state, &state_info.assigned_replicas)?;

        state.in_sync_replicas.clear();
        state.leader_epoch = state_info.leader_epoch;
        state.zk_version = state_info.zk_version;
        state.leader_replica_id = Some(state_info.leader);

        Ok(PartitionOpOutcome::Applied)
    }

    /// Truncate the local log to `offset`. Coordinator-driven, run after
    /// fetchers are stopped and before `make_follower`.
    pub fn truncate_local_log(&self, offset: i64) -> Result<(), PartitionOpError> {
        let mut state = self.state.lock();
        self.get_or_create_replica_locked(&mut state, self.local_broker_id)?;
        if let Some(Replica::Local { log, leo, .. }) = state.assigned_replicas.get_mut(&self.local_broker_id) {
            log.truncate(offset)?;
            *leo = log.log_end_offset();
        }
        Ok(())
    }

    /// Leader-only entry point.
    pub fn record_follower_position(&self, follower: BrokerId, offset: i64) -> Result<(), PartitionOpError> {
        let mut state = self.state.lock();
        if !state.assigned_replicas.contains_key(&follower) {
            return Err(PartitionOpError::Protocol(ErrorCode::NotAssignedReplica));
        }

        let now = Instant::now();
        if let Some(replica) = state.assigned_replicas.get_mut(&follower) {
            replica.set_leo(offset, now);
        }

        if !state.in_sync_replicas.contains(&follower) {
            self.maybe_expand_isr_locked(&mut state, follower)?;
        }

        maybe_increment_leader_hw_locked(&mut state, self.local_broker_id);
        Ok(())
    }

    fn maybe_expand_isr_locked(&self, state: &mut PartitionState, follower: BrokerId) -> Result<(), PartitionOpError> {
        let leader_hw = match state.assigned_replicas.get(&self.local_broker_id) {
            Some(Replica::Local { high_watermark, .. }) => *high_watermark,
            _ => return Ok(()),
        };
        let follower_leo = state.assigned_replicas.get(&follower).and_then(|r| r.leo());

        if let Some(leo) = follower_leo {
            if leo >= leader_hw {
                let mut new_isr = state.in_sync_replicas.clone();
                new_isr.push(follower);
                if self.update_isr_locked(state, &new_isr)? {
                    state.in_sync_replicas = new_isr;
                }
            }
        }
        Ok(())
    }

    /// Called periodically by the coordinator, only on partitions this
    /// broker leads.
    pub fn maybe_shrink_isr(&self, max_lag_time: Duration, max_lag_messages: i64) -> Result<bool, PartitionOpError> {
        let mut state = self.state.lock();
        let Some(leader_id) = state.leader_replica_id else { return Ok(false) };
        if leader_id != self.local_broker_id {
            return Ok(false);
        }
        let leader_leo = match state.assigned_replicas.get(&leader_id) {
            Some(Replica::Local { leo, .. }) => *leo,
            _ => return Ok(false),
        };

        let now = Instant::now();
        let out_of_sync: Vec<BrokerId> = state
            .in_sync_replicas
            .iter()
            .filter(|&&id| id != leader_id)
            .filter(|&&id| {
                let Some(replica) = state.assigned_replicas.get(&id) else { return false };
                let leo = replica.leo();
                let stuck = leo.is_none_or(|l| l < leader_leo) && now.duration_since(replica.leo_update_time()) > max_lag_time;
                let slow = leo.is_some_and(|l| leader_leo - l > max_lag_messages);
                stuck || slow
            })
            .copied()
            .collect();

        if out_of_sync.is_empty() {
            return Ok(false);
        }

        let new_isr: Vec<BrokerId> = state
            .in_sync_replicas
            .iter()
            .filter(|id| !out_of_sync.contains(id))
            .copied()
            .collect();
        assert!(!new_isr.is_empty(), "the leader must always remain in its own ISR");

        if self.update_isr_locked(&mut state, &new_isr)? {
            state.in_sync_replicas = new_isr;
            maybe_increment_leader_hw_locked(&mut state, self.local_broker_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn check_enough_replicas_reach_offset(&self, required_offset: i64, required_acks: i32) -> (bool, ErrorCode) {
        let state = self.state.lock();
        let Some(leader_id) = state.leader_replica_id else {
            return (false, ErrorCode::NotLeaderForPartition);
        };
        if leader_id != self.local_broker_id {
            return (false, ErrorCode::NotLeaderForPartition);
        }

        let count = state
            .in_sync_replicas
            .iter()
            .filter(|&&id| {
                id == leader_id
                    || state
                        .assigned_replicas
                        .get(&id)
                        .and_then(|r| r.leo())
                        .is_some_and(|leo| leo >= required_offset)
            })
            .count();

        let satisfied = match required_acks {
            acks if acks < 0 => count >= state.in_sync_replicas.len(),
            0 => true,
            acks => count >= acks as usize,
        };
        (satisfied, ErrorCode::NoError)
    }

    /// Leader-only.
    pub fn append_messages_to_leader(&self, batch: &[Vec<u8>]) -> Result<Vec<i64>, PartitionOpError> {
        let mut state = self.state.lock();
        if state.leader_replica_id != Some(self.local_broker_id) {
            return Err(PartitionOpError::Protocol(ErrorCode::NotLeaderForPartition));
        }

        let log = match state.assigned_replicas.get(&self.local_broker_id) {
            Some(Replica::Local { log, .. }) => Arc::clone(log),
            _ => return Err(PartitionOpError::Protocol(ErrorCode::NotLeaderForPartition)),
        };

        let mut offsets = Vec::with_capacity(batch.len());
        for record in batch {
            offsets.push(log.append(record)?);
        }

        if let Some(Replica::Local { leo, leo_update_time, .. }) = state.assigned_replicas.get_mut(&self.local_broker_id) {
            *leo = log.log_end_offset();
            *leo_update_time = Instant::now();
        }

        maybe_increment_leader_hw_locked(&mut state, self.local_broker_id);
        Ok(offsets)
    }

    /// Attempts a CAS at the partition's leader/ISR path, preconditioned on
    /// the cached `zk_version`. On precondition failure, local ISR is left
    /// untouched; the next controller message reconciles it.
    fn update_isr_locked(&self, state: &mut PartitionState, new_isr: &[BrokerId]) -> Result<bool, PartitionOpError> {
        let Some(leader) = state.leader_replica_id else {
            return Ok(false);
        };
        let record = LeaderIsrRecord {
            leader,
            leader_epoch: state.leader_epoch,
            isr: new_isr.to_vec(),
            controller_epoch: state.controller_epoch,
        };
        let path = partition_path(&self.topic, self.partition_id);
        let (ok, new_version) = self
            .metadata_store
            .conditional_update(&path, &record, state.zk_version)?;
        if ok {
            state.zk_version = new_version;
        }
        Ok(ok)
    }
}

fn maybe_increment_leader_hw_locked(state: &mut PartitionState, local_broker_id: BrokerId) {
    if state.leader_replica_id != Some(local_broker_id) {
        return;
    }

    let candidate = state
        .in_sync_replicas
        .iter()
        .filter_map(|id| state.assigned_replicas.get(id))
        .filter_map(|r| r.leo())
        .min();

    let Some(candidate) = candidate else { return };
    if let Some(Replica::Local { high_watermark, .. }) = state.assigned_replicas.get_mut(&local_broker_id) {
        if candidate > *high_watermark {
            *high_watermark = candidate;
        }
    }
}
