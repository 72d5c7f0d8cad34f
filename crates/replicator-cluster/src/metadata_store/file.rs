//! File-based metadata store implementation.
//!
//! Persists the full `{path -> (record, version)}` map to a single JSON
//! file in the broker's data directory. Writes go through a temp-file +
//! rename, matching the durability pattern used for the HW checkpoint, so
//! a crash mid-write never leaves a torn metadata file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ClusterError;
use crate::metadata_store::r#trait::{LeaderIsrRecord, MetadataStore};
use crate::types::ZkVersion;

const METADATA_FILE_NAME: &str = "cluster_metadata.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    records: HashMap<String, (LeaderIsrRecord, ZkVersion)>,
}

/// File-based implementation of `MetadataStore`. Stores every path's
/// record in a single JSON file within the broker's data directory.
#[derive(Debug)]
pub struct FileMetadataStore {
    state: RwLock<PersistedState>,
    file_path: PathBuf,
}

impl FileMetadataStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, ClusterError> {
        let file_path = Self::setup_metadata_file(data_dir)?;
        let state = Self::load_existing_metadata(&file_path)?;

        info!(
            "loaded {} metadata records from {}",
            state.records.len(),
            file_path.display()
        );

        let store = Self {
            state: RwLock::new(state),
            file_path,
        };
        store.persist_to_disk()?;
        Ok(store)
    }

    fn setup_metadata_file<P: AsRef<Path>>(data_dir: P) -> Result<PathBuf, ClusterError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .map_err(|e| ClusterError::from_io_error(e, "setup metadata directory"))?;
        }
        Ok(data_dir.join(METADATA_FILE_NAME))
    }

    fn load_existing_metadata(file_path: &Path) -> Result<PersistedState, ClusterError> {
        if !file_path.exists() {
            debug!("metadata file doesn't exist, starting with empty state");
            return Ok(PersistedState::default());
        }

        let content = std::fs::read_to_string(file_path)
            .map_err(|e| ClusterError::from_io_error(e, "load metadata file"))?;

        if content.trim().is_empty() {
            return Ok(PersistedState::default());
        }

        serde_json::from_str(&content)
            .map_err(|e| ClusterError::from_parse_error(e, "parse metadata file"))
    }

    fn persist_to_disk(&self) -> Result<(), ClusterError> {
        let state = self.state.read();
        let content = serde_json::to_string_pretty(&*state)
            .map_err(|e| ClusterError::from_parse_error(e, "serialize metadata"))?;
        drop(state);

        let tmp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .map_err(|e| ClusterError::from_io_error(e, "write metadata temp file"))?;
        std::fs::rename(&tmp_path, &self.file_path)
            .map_err(|e| ClusterError::from_io_error(e, "rename metadata temp file into place"))?;

        debug!("persisted cluster metadata to {}", self.file_path.display());
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn conditional_update(
        &self,
        path: &str,
        payload: &LeaderIsrRecord,
        expected_version: ZkVersion,
    ) -> Result<(bool, ZkVersion), ClusterError> {
        let new_version = {
            let mut state = self.state.write();
            match state.records.get(path) {
                Some((_, current_version)) if *current_version == expected_version => {
                    let new_version = ZkVersion(current_version.0 + 1);
                    state
                        .records
                        .insert(path.to_string(), (payload.clone(), new_version));
                    Some(new_version)
                }
                Some((_, current_version)) => return Ok((false, *current_version)),
                None => {
                    return Err(ClusterError::MetadataStore {
                        context: path.to_string(),
                        reason: "conditional_update on nonexistent path".to_string(),
                    });
                }
            }
        };

        let new_version = new_version.expect("checked above");
        self.persist_to_disk()?;
        Ok((true, new_version))
    }

    fn conditional_create(
        &self,
        path: &str,
        payload: &LeaderIsrRecord,
    ) -> Result<ZkVersion, ClusterError> {
        {
            let mut state = self.state.write();
            if state.records.contains_key(path) {
                return Err(ClusterError::MetadataStore {
                    context: path.to_string(),
                    reason: "path already exists".to_string(),
                });
            }
            state
                .records
                .insert(path.to_string(), (payload.clone(), ZkVersion(0)));
        }
        self.persist_to_disk()?;
        Ok(ZkVersion(0))
    }

    fn read(&self, path: &str) -> Result<Option<(LeaderIsrRecord, ZkVersion)>, ClusterError> {
        Ok(self.state.read().records.get(path).cloned())
    }
}
