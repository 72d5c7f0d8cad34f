//! Control-plane contract over the external fetcher subsystem.
//!
//! The fetcher subsystem itself (background threads pulling records from a
//! remote leader into a local follower log) is an external collaborator;
//! this module specifies only the operations the coordinator performs on it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::requests::PartitionKey;
use crate::types::BrokerId;

/// Operations the coordinator needs from the fetcher subsystem. Fetchers
/// themselves are expected, for every batch they append to a local follower
/// log, to call back into the coordinator's `record_follower_position` so
/// the leader learns of follower progress; that callback is not part of
/// this trait since it flows the other direction.
#[async_trait]
pub trait FetcherManager: Send + Sync {
    /// Stop and remove any fetcher threads pulling for these partitions.
    /// Idempotent.
    async fn remove_fetcher_for_partitions(&self, partitions: &[PartitionKey]);

    /// Start fetching each `(topic, partition)` from `leader`, beginning at
    /// `initial_offset`.
    async fn add_fetcher_for_partitions(&self, assignments: &[(PartitionKey, BrokerId, i64)]);

    /// Best-effort cleanup of fetcher threads with no assigned partitions.
    async fn shutdown_idle_fetcher_threads(&self);

    /// Terminate all fetcher work.
    async fn shutdown(&self);
}

/// A [`FetcherManager`] that does nothing but remember which partitions are
/// currently assigned, for use in the coordinator's own test suite in place
/// of the real fetcher subsystem.
#[derive(Default)]
pub struct NullFetcherManager {
    active: Mutex<HashSet<PartitionKey>>,
    shutdown_called: Mutex<bool>,
}

impl NullFetcherManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions currently believed to have an active fetcher, for test
    /// assertions.
    pub fn active_partitions(&self) -> Vec<PartitionKey> {
        self.active.lock().iter().cloned().collect()
    }

    pub fn was_shutdown(&self) -> bool {
        *self.shutdown_called.lock()
    }
}

#[async_trait]
impl FetcherManager for NullFetcherManager {
    async fn remove_fetcher_for_partitions(&self, partitions: &[PartitionKey]) {
        let mut active = self.active.lock();
        for key in partitions {
            active.remove(key);
        }
    }

    async fn add_fetcher_for_partitions(&self, assignments: &[(PartitionKey, BrokerId, i64)]) {
        let mut active = self.active.lock();
        for (key, _leader, _initial_offset) in assignments {
            active.insert(key.clone());
        }
    }

    async fn shutdown_idle_fetcher_threads(&self) {}

    async fn shutdown(&self) {
        self.active.lock().clear();
        *self.shutdown_called.lock() = true;
    }
}
