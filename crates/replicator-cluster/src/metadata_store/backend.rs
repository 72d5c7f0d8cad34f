//! Metadata store backend selection.

use crate::ClusterError;
use crate::metadata_store::{file::FileMetadataStore, memory::InMemoryMetadataStore, r#trait::MetadataStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Backend storage configuration for the metadata store.
#[derive(Debug, Clone)]
pub enum MetadataBackend {
    /// In-memory storage backend.
    ///
    /// Fast but ephemeral: all metadata is lost on restart. Suitable for
    /// development, testing, and single-node deployments.
    Memory,
    /// JSON file storage backend rooted at the given data directory.
    File(PathBuf),
}

impl MetadataBackend {
    pub fn new_memory() -> Self {
        MetadataBackend::Memory
    }

    pub fn new_file<P: Into<PathBuf>>(data_dir: P) -> Self {
        MetadataBackend::File(data_dir.into())
    }

    /// Create a metadata store instance from this backend configuration.
    pub fn create(&self) -> Result<Arc<dyn MetadataStore>, ClusterError> {
        match self {
            MetadataBackend::Memory => Ok(Arc::new(InMemoryMetadataStore::new())),
            MetadataBackend::File(data_dir) => {
                Ok(Arc::new(FileMetadataStore::new(data_dir)?))
            }
        }
    }
}

impl Default for MetadataBackend {
    fn default() -> Self {
        Self::new_memory()
    }
}
