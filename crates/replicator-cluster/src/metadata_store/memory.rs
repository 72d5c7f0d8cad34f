//! In-memory metadata store implementation.

use crate::ClusterError;
use crate::metadata_store::r#trait::{LeaderIsrRecord, MetadataStore};
use crate::types::ZkVersion;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory implementation of the `MetadataStore` trait. Suitable for
/// development, testing, and single-node deployments where persistence
/// across restarts is not required.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<String, (LeaderIsrRecord, ZkVersion)>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn conditional_update(
        &self,
        path: &str,
        payload: &LeaderIsrRecord,
        expected_version: ZkVersion,
    ) -> Result<(bool, ZkVersion), ClusterError> {
        let mut records = self.records.write();
        match records.get(path) {
            Some((_, current_version)) if *current_version == expected_version => {
                let new_version = ZkVersion(current_version.0 + 1);
                records.insert(path.to_string(), (payload.clone(), new_version));
                Ok((true, new_version))
            }
            Some((_, current_version)) => Ok((false, *current_version)),
            None => Err(ClusterError::MetadataStore {
                context: path.to_string(),
                reason: "conditional_update on nonexistent path".to_string(),
            }),
        }
    }

    fn conditional_create(
        &self,
        path: &str,
        payload: &LeaderIsrRecord,
    ) -> Result<ZkVersion, ClusterError> {
        let mut records = self.records.write();
        if records.contains_key(path) {
            return Err(ClusterError::MetadataStore {
                context: path.to_string(),
                reason: "path already exists".to_string(),
            });
        }
        let version = ZkVersion(0);
        records.insert(path.to_string(), (payload.clone(), version));
        Ok(version)
    }

    fn read(&self, path: &str) -> Result<Option<(LeaderIsrRecord, ZkVersion)>, ClusterError> {
        Ok(self.records.read().get(path).cloned())
    }
}
