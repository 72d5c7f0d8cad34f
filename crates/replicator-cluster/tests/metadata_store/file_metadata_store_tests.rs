//! Integration tests for file-based metadata store implementation.

use replicator_cluster::metadata_store::r#trait::{LeaderIsrRecord, partition_path};
use replicator_cluster::metadata_store::{FileMetadataStore, MetadataStore};
use replicator_cluster::types::{BrokerId, ControllerEpoch, LeaderEpoch, PartitionId, ZkVersion};
use tempfile::TempDir;

fn record(leader: u32, epoch: i64, isr: Vec<u32>) -> LeaderIsrRecord {
    LeaderIsrRecord {
        leader: BrokerId(leader),
        leader_epoch: LeaderEpoch(epoch),
        isr: isr.into_iter().map(BrokerId).collect(),
        controller_epoch: ControllerEpoch(0),
    }
}

#[test]
fn test_file_store_creation() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileMetadataStore::new(temp_dir.path()).unwrap();

    let path = partition_path("test-topic", PartitionId::new(0));
    assert_eq!(store.read(&path).unwrap(), None);

    let metadata_file = temp_dir.path().join("cluster_metadata.json");
    assert!(metadata_file.exists());
}

#[test]
fn test_create_and_read_record() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileMetadataStore::new(temp_dir.path()).unwrap();
    let path = partition_path("test-topic", PartitionId::new(0));

    store
        .conditional_create(&path, &record(1, 5, vec![1, 2, 3]))
        .unwrap();

    let (payload, version) = store.read(&path).unwrap().unwrap();
    assert_eq!(payload.leader, BrokerId(1));
    assert_eq!(payload.leader_epoch, LeaderEpoch(5));
    assert_eq!(version, ZkVersion(0));
}

#[test]
fn test_persistence_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let path = partition_path("test-topic", PartitionId::new(0));

    {
        let store = FileMetadataStore::new(temp_dir.path()).unwrap();
        let v0 = store
            .conditional_create(&path, &record(1, 5, vec![1, 2, 3]))
            .unwrap();
        store
            .conditional_update(&path, &record(1, 6, vec![1, 2, 3]), v0)
            .unwrap();
    }

    {
        let store = FileMetadataStore::new(temp_dir.path()).unwrap();
        let (payload, _) = store.read(&path).unwrap().unwrap();
        assert_eq!(payload.leader_epoch, LeaderEpoch(6));
    }
}

#[test]
fn test_compare_and_set_operations() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileMetadataStore::new(temp_dir.path()).unwrap();
    let path = partition_path("test-topic", PartitionId::new(0));

    let v0 = store
        .conditional_create(&path, &record(1, 5, vec![1, 2, 3]))
        .unwrap();

    let (ok, v1) = store
        .conditional_update(&path, &record(1, 6, vec![1, 2, 3]), v0)
        .unwrap();
    assert!(ok);

    // Stale version is rejected, no local mutation.
    let (ok, rejected_version) = store
        .conditional_update(&path, &record(1, 7, vec![1, 2, 3]), v0)
        .unwrap();
    assert!(!ok);
    assert_eq!(rejected_version, v1);
}

#[test]
fn test_conditional_create_twice_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileMetadataStore::new(temp_dir.path()).unwrap();
    let path = partition_path("test-topic", PartitionId::new(0));

    store
        .conditional_create(&path, &record(1, 5, vec![1, 2, 3]))
        .unwrap();
    let result = store.conditional_create(&path, &record(2, 0, vec![2]));
    assert!(result.is_err());
}

#[test]
fn test_concurrent_modifications_are_serialized() {
    let temp_dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(FileMetadataStore::new(temp_dir.path()).unwrap());
    let path = partition_path("test-topic", PartitionId::new(0));
    store
        .conditional_create(&path, &record(1, 0, vec![1, 2, 3]))
        .unwrap();

    let mut handles = vec![];
    for _ in 0..10 {
        let store = std::sync::Arc::clone(&store);
        let path = path.clone();
        handles.push(std::thread::spawn(move || {
            loop {
                let (_, version) = store.read(&path).unwrap().unwrap();
                let (ok, _) = store
                    .conditional_update(&path, &record(1, version.0 + 1, vec![1, 2, 3]), version)
                    .unwrap();
                if ok {
                    break;
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let (payload, version) = store.read(&path).unwrap().unwrap();
    assert_eq!(version, ZkVersion(10));
    assert_eq!(payload.leader_epoch, LeaderEpoch(10));
}

#[test]
fn test_corrupted_file_handling() {
    let temp_dir = TempDir::new().unwrap();
    let metadata_file = temp_dir.path().join("cluster_metadata.json");
    std::fs::write(&metadata_file, "{ invalid json }").unwrap();

    let result = FileMetadataStore::new(temp_dir.path());
    assert!(result.is_err());
}

#[test]
fn test_empty_file_handling() {
    let temp_dir = TempDir::new().unwrap();
    let metadata_file = temp_dir.path().join("cluster_metadata.json");
    std::fs::write(&metadata_file, "").unwrap();

    let store = FileMetadataStore::new(temp_dir.path()).unwrap();
    let path = partition_path("test-topic", PartitionId::new(0));
    assert_eq!(store.read(&path).unwrap(), None);
}

#[test]
fn test_file_permissions() {
    let temp_dir = TempDir::new().unwrap();
    let _store = FileMetadataStore::new(temp_dir.path()).unwrap();

    let metadata_file = temp_dir.path().join("cluster_metadata.json");
    assert!(metadata_file.exists());

    let metadata = std::fs::metadata(&metadata_file).unwrap();
    assert!(!metadata.permissions().readonly());
}
