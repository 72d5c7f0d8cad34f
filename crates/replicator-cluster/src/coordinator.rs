//! Coordinator: controller request intake, leader/follower batching, and
//! the periodic ISR-shrink / HW-checkpoint background tasks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use replicator_storage::{HwCheckpointStore, LogManager, abort_on_checkpoint_failure};

use crate::config::CoordinatorConfig;
use crate::error::ErrorCode;
use crate::fetcher::FetcherManager;
use crate::metadata_store::MetadataStore;
use crate::partition::{Partition, PartitionOpOutcome};
use crate::requests::{
    LeaderAndIsrRequest, LeaderAndIsrResponse, PartitionKey, PartitionStateInfo, StopReplicaRequest,
    StopReplicaResponse,
};
use crate::types::{BrokerId, ControllerEpoch};
use crate::{debug, error, info, warn};

/// Single per-broker instance driving every hosted partition's lifecycle.
pub struct Coordinator {
    local_broker_id: BrokerId,
    config: CoordinatorConfig,
    log_manager: Arc<dyn LogManager>,
    metadata_store: Arc<dyn MetadataStore>,
    checkpoint_store: Arc<HwCheckpointStore>,
    fetcher_manager: Arc<dyn FetcherManager>,

    all_partitions: RwLock<HashMap<PartitionKey, Arc<Partition>>>,
    leader_partitions: Mutex<HashSet<PartitionKey>>,
    replica_state_change_lock: Mutex<()>,
    controller_epoch: Mutex<ControllerEpoch>,

    background_tasks_started: AtomicBool,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    self_weak: Weak<Coordinator>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        log_manager: Arc<dyn LogManager>,
        metadata_store: Arc<dyn MetadataStore>,
        checkpoint_store: Arc<HwCheckpointStore>,
        fetcher_manager: Arc<dyn FetcherManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            local_broker_id: config.broker_id,
            config,
            log_manager,
            metadata_store,
            checkpoint_store,
            fetcher_manager,
            all_partitions: RwLock::new(HashMap::new()),
            leader_partitions: Mutex::new(HashSet::new()),
            replica_state_change_lock: Mutex::new(()),
            controller_epoch: Mutex::new(ControllerEpoch(0)),
            background_tasks_started: AtomicBool::new(false),
            background_tasks: Mutex::new(Vec::new()),
            self_weak: weak.clone(),
        })
    }

    pub fn local_broker_id(&self) -> BrokerId {
        self.local_broker_id
    }

    pub fn leader_partitions(&self) -> Vec<PartitionKey> {
        self.leader_partitions.lock().iter().cloned().collect()
    }

    /// Look up a hosted partition by name, if the coordinator has seen it.
    pub fn get_partition(&self, topic: &str, partition_id: crate::types::PartitionId) -> Option<Arc<Partition>> {
        self.all_partitions.read().get(&(topic.to_string(), partition_id)).cloned()
    }

    fn get_or_create_partition(&self, topic: &str, key: &PartitionKey) -> Arc<Partition> {
        if let Some(partition) = self.all_partitions.read().get(key) {
            return Arc::clone(partition);
        }
        let mut partitions = self.all_partitions.write();
        Arc::clone(partitions.entry(key.clone()).or_insert_with(|| {
            Arc::new(Partition::new(
                topic.to_string(),
                key.1,
                self.local_broker_id,
                Arc::clone(&self.log_manager),
                Arc::clone(&self.metadata_store),
                Arc::clone(&self.checkpoint_store),
            ))
        }))
    }

    /// Controller-epoch fence: reject a stale epoch without
    /// mutating anything; otherwise adopt it.
    fn check_and_adopt_controller_epoch(&self, incoming: ControllerEpoch) -> bool {
        let mut epoch = self.controller_epoch.lock();
        if incoming < *epoch {
            return false;
        }
        *epoch = incoming;
        true
    }

    pub async fn become_leader_or_follower(&self, request: LeaderAndIsrRequest) -> LeaderAndIsrResponse {
        let _guard = self.replica_state_change_lock.lock();
        let mut response = LeaderAndIsrResponse::default();

        if !self.check_and_adopt_controller_epoch(request.controller_epoch) {
            warn!(
                "rejecting LeaderAndIsr request {} with stale controller epoch {:?}",
                request.correlation_id, request.controller_epoch
            );
            response.error = ErrorCode::StaleControllerEpoch;
            return response;
        }

        let mut to_leader = Vec::new();
        let mut to_follower = Vec::new();

        for (key, state_info) in &request.partition_states {
            let partition = self.get_or_create_partition(&key.0, key);
            if partition.leader_epoch() >= state_info.leader_epoch {
                response.partition_errors.insert(key.clone(), ErrorCode::StaleLeaderEpoch);
                continue;
            }

            if state_info.leader == self.local_broker_id {
                to_leader.push((key.clone(), partition, state_info.clone()));
            } else {
                to_follower.push((key.clone(), partition, state_info.clone()));
            }
        }

        self.make_leaders(&to_leader, &mut response).await;
        self.make_followers(&to_follower, &request.leaders, &mut response).await;

        self.start_background_tasks_if_needed();
        self.fetcher_manager.shutdown_idle_fetcher_threads().await;

        response
    }

    async fn make_leaders(
        &self,
        batch: &[(PartitionKey, Arc<Partition>, PartitionStateInfo)],
        response: &mut LeaderAndIsrResponse,
    ) {
        if batch.is_empty() {
            return;
        }

        let keys: Vec<PartitionKey> = batch.iter().map(|(key, ..)| key.clone()).collect();
        self.fetcher_manager.remove_fetcher_for_partitions(&keys).await;

        for (key, partition, state_info) in batch {
            match partition.make_leader(self.controller_epoch(), state_info) {
                Ok(()) => {
                    response.partition_errors.insert(key.clone(), ErrorCode::NoError);
                    self.leader_partitions.lock().insert(key.clone());
                }
                Err(err) => {
                    error!("make_leader failed for {}/{}: {err}", key.0, key.1);
                    response.partition_errors.insert(key.clone(), ErrorCode::ReplicaNotAvailable);
                }
            }
        }
    }

    /// Truncates each local log to the partition's current HW *before*
    /// installing new fetchers, so a formerly-leading broker never serves
    /// an uncommitted suffix to its new leader.
    async fn make_followers(
        &self,
        batch: &[(PartitionKey, Arc<Partition>, PartitionStateInfo)],
        leaders: &[crate::requests::BrokerEndpoint],
        response: &mut LeaderAndIsrResponse,
    ) {
        if batch.is_empty() {
            return;
        }

        let keys: Vec<PartitionKey> = batch.iter().map(|(key, ..)| key.clone()).collect();
        self.fetcher_manager.remove_fetcher_for_partitions(&keys).await;

        let leader_ids: Vec<BrokerId> = leaders.iter().map(|b| b.broker_id).collect();
        let mut fetcher_assignments = Vec::new();

        for (key, partition, state_info) in batch {
            if let Err(err) = partition.get_or_create_replica(self.local_broker_id) {
                error!("failed to open local log for {}/{}: {err}", key.0, key.1);
                response.partition_errors.insert(key.clone(), ErrorCode::ReplicaNotAvailable);
                continue;
            }

            let hw = partition.local_high_watermark().unwrap_or(0);
            if let Err(err) = partition.truncate_local_log(hw) {
                error!("failed to truncate local log for {}/{}: {err}", key.0, key.1);
                response.partition_errors.insert(key.clone(), ErrorCode::ReplicaNotAvailable);
                continue;
            }

            match partition.make_follower(self.controller_epoch(), state_info, &leader_ids) {
                Ok(PartitionOpOutcome::Applied) => {
                    let leo = partition.local_log_end_offset().unwrap_or(0);
                    fetcher_assignments.push((key.clone(), state_info.leader, leo));
                    response.partition_errors.insert(key.clone(), ErrorCode::NoError);
                    self.leader_partitions.lock().remove(key);
                }
                Ok(PartitionOpOutcome::LeaderBrokerNotFound) => {
                    response.partition_errors.insert(key.clone(), ErrorCode::ReplicaNotAvailable);
                }
                Err(err) => {
                    error!("make_follower failed for {}/{}: {err}", key.0, key.1);
                    response.partition_errors.insert(key.clone(), ErrorCode::ReplicaNotAvailable);
                }
            }
        }

        self.fetcher_manager.add_fetcher_for_partitions(&fetcher_assignments).await;
    }

    /// Routes to the named partition; warns and drops if the partition is
    /// unknown.
    pub fn record_follower_position(&self, topic: &str, key: &PartitionKey, broker_id: BrokerId, offset: i64) {
        let partition = self.all_partitions.read().get(key).cloned();
        match partition {
            Some(partition) => {
                if let Err(err) = partition.record_follower_position(broker_id, offset) {
                    warn!("record_follower_position rejected for {topic}/{}: {err}", key.1);
                }
            }
            None => warn!("record_follower_position for unknown partition {topic}/{}", key.1),
        }
    }

    pub async fn stop_replicas(&self, request: StopReplicaRequest) -> StopReplicaResponse {
        let _guard = self.replica_state_change_lock.lock();
        let mut response = StopReplicaResponse::default();

        if !self.check_and_adopt_controller_epoch(request.controller_epoch) {
            response.error = ErrorCode::StaleControllerEpoch;
            return response;
        }

        self.fetcher_manager.remove_fetcher_for_partitions(&request.partitions).await;

        for key in &request.partitions {
            self.leader_partitions.lock().remove(key);
            if request.delete_partitions {
                self.all_partitions.write().remove(key);
            }
            response.partition_errors.insert(key.clone(), ErrorCode::NoError);
        }

        response
    }

    fn controller_epoch(&self) -> ControllerEpoch {
        *self.controller_epoch.lock()
    }

    /// Iterate leader partitions once and shrink any whose ISR has fallen
    /// out of sync. Exposed separately from the periodic task so tests can
    /// drive it deterministically.
    pub fn run_isr_shrink_once(&self) {
        let snapshot: Vec<PartitionKey> = self.leader_partitions();
        for key in snapshot {
            let Some(partition) = self.all_partitions.read().get(&key).cloned() else { continue };
            match partition.maybe_shrink_isr(self.config.max_lag_time(), self.config.max_lag_messages) {
                Ok(true) => info!("shrunk ISR for {}/{}", key.0, key.1),
                Ok(false) => {}
                Err(err) => warn!("maybe_shrink_isr failed for {}/{}: {err}", key.0, key.1),
            }
        }
    }

    /// Collect every local replica's HW and checkpoint it atomically. A
    /// write failure here is fatal to the process.
    pub fn run_hw_checkpoint_once(&self) {
        let mut offsets = HashMap::new();
        for (key, partition) in self.all_partitions.read().iter() {
            if let Some(hw) = partition.local_high_watermark() {
                offsets.insert((key.0.clone(), key.1.as_u32() as i32), hw);
            }
        }

        debug!("checkpointing HW for {} partitions", offsets.len());
        if let Err(err) = self.checkpoint_store.write(&offsets) {
            abort_on_checkpoint_failure(&err);
        }
    }

    fn start_background_tasks_if_needed(&self) {
        if self.background_tasks_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(strong) = self.self_weak.upgrade() else { return };

        let checkpoint_task = {
            let coordinator = Arc::clone(&strong);
            tokio::spawn(async move { coordinator.run_periodic_hw_checkpoint_loop().await })
        };
        let isr_shrink_task = {
            let coordinator = Arc::clone(&strong);
            tokio::spawn(async move { coordinator.run_periodic_isr_shrink_loop().await })
        };

        self.background_tasks.lock().extend([checkpoint_task, isr_shrink_task]);
    }

    async fn run_periodic_hw_checkpoint_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.hw_checkpoint_interval());
        loop {
            ticker.tick().await;
            self.run_hw_checkpoint_once();
        }
    }

    async fn run_periodic_isr_shrink_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.isr_shrink_check_interval());
        loop {
            ticker.tick().await;
            self.run_isr_shrink_once();
        }
    }

    /// Stop the fetcher subsystem, then run one final synchronous HW
    /// checkpoint.
    pub async fn shutdown(&self) {
        for task in self.background_tasks.lock().drain(..) {
            task.abort();
        }
        self.fetcher_manager.shutdown().await;
        self.run_hw_checkpoint_once();
    }
}
