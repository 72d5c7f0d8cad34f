//! End-to-end coordinator scenarios, adapted from the design's seed suite.
//!
//! The fetcher subsystem itself is external and out of scope, so these
//! scenarios simulate a follower's contribution by calling
//! `record_follower_position` directly with the offset its (hypothetical)
//! fetcher would have reported, rather than wiring up a second broker's
//! log manager end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use replicator_cluster::config::CoordinatorConfig;
use replicator_cluster::coordinator::Coordinator;
use replicator_cluster::error::ErrorCode;
use replicator_cluster::fetcher::NullFetcherManager;
use replicator_cluster::metadata_store::{FileMetadataStore, InMemoryMetadataStore};
use replicator_cluster::requests::{BrokerEndpoint, LeaderAndIsrRequest, PartitionStateInfo};
use replicator_cluster::types::{BrokerId, ControllerEpoch, LeaderEpoch, PartitionId, ZkVersion};
use replicator_storage::{FileLogManager, HwCheckpointStore, InMemoryLogManager, LogManager, PartitionLogHandle};
use tempfile::TempDir;

fn single_partition_request(
    topic: &str,
    leader: u32,
    isr: Vec<u32>,
    assigned: Vec<u32>,
    controller_epoch: i64,
    leader_epoch: i64,
) -> LeaderAndIsrRequest {
    let mut partition_states = HashMap::new();
    partition_states.insert(
        (topic.to_string(), PartitionId::new(0)),
        PartitionStateInfo {
            replication_factor: assigned.len() as u8,
            assigned_replicas: assigned.iter().copied().map(BrokerId).collect(),
            leader: BrokerId(leader),
            leader_epoch: LeaderEpoch(leader_epoch),
            isr: isr.into_iter().map(BrokerId).collect(),
            zk_version: ZkVersion(0),
            controller_epoch: ControllerEpoch(controller_epoch),
        },
    );

    LeaderAndIsrRequest {
        controller_id: BrokerId(100),
        controller_epoch: ControllerEpoch(controller_epoch),
        correlation_id: 1,
        partition_states,
        leaders: assigned
            .into_iter()
            .map(|id| BrokerEndpoint {
                broker_id: BrokerId(id),
                host: "127.0.0.1".to_string(),
                port: 6000 + id as u16,
            })
            .collect(),
    }
}

/// S1: HW checkpoint, no failures, single segment.
#[tokio::test]
async fn s1_hw_checkpoint_reaches_replicated_offset() {
    let dir = TempDir::new().unwrap();
    let config = CoordinatorConfig::new(BrokerId(0), dir.path());
    let coordinator = Coordinator::new(
        config,
        Arc::new(InMemoryLogManager::default()),
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(HwCheckpointStore::new(dir.path())),
        Arc::new(NullFetcherManager::new()),
    );

    let request = single_partition_request("orders", 0, vec![0, 1], vec![0, 1], 0, 0);
    let response = coordinator.become_leader_or_follower(request).await;
    assert_eq!(response.error, ErrorCode::NoError);

    let key = ("orders".to_string(), PartitionId::new(0));
    let partition = coordinator.get_partition("orders", PartitionId::new(0)).unwrap();
    partition
        .append_messages_to_leader(&[b"rec-0".to_vec(), b"rec-1".to_vec()])
        .unwrap();

    // Follower's fetcher reports it has replicated both records.
    coordinator.record_follower_position("orders", &key, BrokerId(1), 2);
    assert_eq!(partition.local_high_watermark(), Some(2));

    coordinator.run_hw_checkpoint_once();

    let checkpoint = HwCheckpointStore::new(dir.path());
    let offsets = checkpoint.read().unwrap();
    assert_eq!(offsets.get(&("orders".to_string(), 0)), Some(&2));
}

/// S2: HW checkpoint after leader failover. Broker 0 leads, broker 1
/// follows and is already fully caught up when broker 0 goes down; the
/// controller promotes broker 1, bumping the leader epoch, and broker 1 is
/// then killed too. Both brokers restart and must read back the correct HW
/// from their own checkpoint file, after which replication continues under
/// the new leader.
#[tokio::test]
async fn s2_hw_checkpoint_survives_leader_failover_and_restart() {
    let root = TempDir::new().unwrap();
    let broker0_dir = root.path().join("broker0");
    let broker1_dir = root.path().join("broker1");

    let log_manager1 = Arc::new(FileLogManager::new(&broker1_dir));
    // Broker 1's fetcher had already replicated these records before
    // broker 0 went down, so its log starts caught up.
    let seed_log = log_manager1.get_or_create("orders", 0).unwrap();
    for record in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()] {
        seed_log.append(&record).unwrap();
    }

    let coordinator0 = Coordinator::new(
        CoordinatorConfig::new(BrokerId(0), &broker0_dir),
        Arc::new(FileLogManager::new(&broker0_dir)),
        Arc::new(FileMetadataStore::new(broker0_dir.join("metadata")).unwrap()),
        Arc::new(HwCheckpointStore::new(&broker0_dir)),
        Arc::new(NullFetcherManager::new()),
    );
    let coordinator1 = Coordinator::new(
        CoordinatorConfig::new(BrokerId(1), &broker1_dir),
        Arc::clone(&log_manager1),
        Arc::new(FileMetadataStore::new(broker1_dir.join("metadata")).unwrap()),
        Arc::new(HwCheckpointStore::new(&broker1_dir)),
        Arc::new(NullFetcherManager::new()),
    );

    let key = ("orders".to_string(), PartitionId::new(0));
    coordinator0
        .become_leader_or_follower(single_partition_request("orders", 0, vec![0, 1], vec![0, 1], 0, 0))
        .await;
    coordinator1
        .become_leader_or_follower(single_partition_request("orders", 0, vec![0, 1], vec![0, 1], 0, 0))
        .await;

    let partition0 = coordinator0.get_partition("orders", PartitionId::new(0)).unwrap();
    partition0
        .append_messages_to_leader(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        .unwrap();
    coordinator0.record_follower_position("orders", &key, BrokerId(1), 3);
    assert_eq!(partition0.local_high_watermark(), Some(3));
    coordinator0.run_hw_checkpoint_once();

    // Broker 0 is gone. The controller promotes broker 1, bumping the
    // leader epoch and dropping broker 0 from the ISR.
    let failover = single_partition_request("orders", 1, vec![1], vec![0, 1], 1, 1);
    let response = coordinator1.become_leader_or_follower(failover).await;
    assert_eq!(response.error, ErrorCode::NoError);
    assert_eq!(response.partition_errors.get(&key), Some(&ErrorCode::NoError));

    let partition1 = coordinator1.get_partition("orders", PartitionId::new(0)).unwrap();
    assert_eq!(partition1.leader_epoch(), LeaderEpoch(1));
    assert!(partition1.is_leader_locally());
    assert_eq!(partition1.local_high_watermark(), Some(3));

    coordinator1.run_hw_checkpoint_once();

    // Broker 1 is killed too. Both brokers restart: fresh checkpoint stores
    // reading the same on-disk files must recover the last HW each wrote.
    let recovered0 = HwCheckpointStore::new(&broker0_dir).read().unwrap();
    let recovered1 = HwCheckpointStore::new(&broker1_dir).read().unwrap();
    assert_eq!(recovered0.get(&("orders".to_string(), 0)), Some(&3));
    assert_eq!(recovered1.get(&("orders".to_string(), 0)), Some(&3));

    // Broker 1 restarts as the new leader and keeps replicating.
    let coordinator1b = Coordinator::new(
        CoordinatorConfig::new(BrokerId(1), &broker1_dir),
        Arc::new(FileLogManager::new(&broker1_dir)),
        Arc::new(FileMetadataStore::new(broker1_dir.join("metadata")).unwrap()),
        Arc::new(HwCheckpointStore::new(&broker1_dir)),
        Arc::new(NullFetcherManager::new()),
    );
    coordinator1b
        .become_leader_or_follower(single_partition_request("orders", 1, vec![1], vec![0, 1], 1, 1))
        .await;

    let partition1b = coordinator1b.get_partition("orders", PartitionId::new(0)).unwrap();
    assert_eq!(partition1b.local_high_watermark(), Some(3));

    partition1b.append_messages_to_leader(&[b"d".to_vec()]).unwrap();
    assert_eq!(partition1b.local_high_watermark(), Some(4));
    coordinator1b.run_hw_checkpoint_once();

    let final_offsets = HwCheckpointStore::new(&broker1_dir).read().unwrap();
    assert_eq!(final_offsets.get(&("orders".to_string(), 0)), Some(&4));
}

/// S3: HW across multiple appends, exercised against the real file-backed
/// log manager and checkpoint store rather than the in-memory doubles.
#[tokio::test]
async fn s3_hw_checkpoint_survives_many_records_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = CoordinatorConfig::new(BrokerId(0), dir.path());
    let coordinator = Coordinator::new(
        config,
        Arc::new(FileLogManager::new(dir.path())),
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(HwCheckpointStore::new(dir.path())),
        Arc::new(NullFetcherManager::new()),
    );

    let request = single_partition_request("orders", 0, vec![0], vec![0], 0, 0);
    coordinator.become_leader_or_follower(request).await;

    let key = ("orders".to_string(), PartitionId::new(0));
    let partition = coordinator.get_partition("orders", PartitionId::new(0)).unwrap();
    for i in 0..20 {
        partition
            .append_messages_to_leader(&[format!("rec-{i}").into_bytes()])
            .unwrap();
    }
    assert_eq!(partition.local_high_watermark(), Some(20));

    coordinator.run_hw_checkpoint_once();

    let checkpoint = HwCheckpointStore::new(dir.path());
    let offsets = checkpoint.read().unwrap();
    assert_eq!(offsets.get(&("orders".to_string(), 0)), Some(&20));
}

/// S4: ISR shrink under a stuck follower, then S5: ISR expand once it
/// catches back up, chained against the same coordinator.
#[tokio::test]
async fn s4_then_s5_isr_shrinks_then_expands() {
    let dir = TempDir::new().unwrap();
    let config = CoordinatorConfig::new(BrokerId(0), dir.path());
    let metadata_dir = dir.path().join("metadata");
    let coordinator = Coordinator::new(
        config,
        Arc::new(InMemoryLogManager::default()),
        Arc::new(FileMetadataStore::new(&metadata_dir).unwrap()),
        Arc::new(HwCheckpointStore::new(dir.path())),
        Arc::new(NullFetcherManager::new()),
    );

    let request = single_partition_request("orders", 0, vec![0, 1], vec![0, 1], 0, 0);
    coordinator.become_leader_or_follower(request).await;

    let key = ("orders".to_string(), PartitionId::new(0));
    let partition = coordinator.get_partition("orders", PartitionId::new(0)).unwrap();
    partition
        .append_messages_to_leader(&[b"a".to_vec(); 5].to_vec())
        .unwrap();

    // Broker 1 never reports a position: with a zero lag-time budget it is
    // immediately considered stuck.
    let shrank = partition.maybe_shrink_isr(Duration::from_millis(0), i64::MAX).unwrap();
    assert!(shrank);
    assert_eq!(partition.in_sync_replicas(), vec![BrokerId(0)]);
    assert_eq!(partition.local_high_watermark(), Some(5));

    // Broker 1 catches up to the leader's HW; its next report expands ISR.
    coordinator.record_follower_position("orders", &key, BrokerId(1), 5);
    assert_eq!(partition.in_sync_replicas(), vec![BrokerId(0), BrokerId(1)]);
    assert_eq!(partition.local_high_watermark(), Some(5));
}

/// S6: a stale controller epoch is rejected wholesale, with no partition
/// state mutated.
#[tokio::test]
async fn s6_stale_controller_epoch_mutates_nothing() {
    let dir = TempDir::new().unwrap();
    let config = CoordinatorConfig::new(BrokerId(0), dir.path());
    let coordinator = Coordinator::new(
        config,
        Arc::new(InMemoryLogManager::default()),
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(HwCheckpointStore::new(dir.path())),
        Arc::new(NullFetcherManager::new()),
    );

    let bootstrap = single_partition_request("orders", 0, vec![0], vec![0], 5, 0);
    coordinator.become_leader_or_follower(bootstrap).await;
    assert_eq!(coordinator.leader_partitions().len(), 1);

    let stale = single_partition_request("orders", 1, vec![1], vec![1], 4, 1);
    let response = coordinator.become_leader_or_follower(stale).await;

    assert_eq!(response.error, ErrorCode::StaleControllerEpoch);
    assert!(response.partition_errors.is_empty());
    // Still leading under the original assignment; nothing was mutated.
    assert_eq!(coordinator.leader_partitions().len(), 1);
}
