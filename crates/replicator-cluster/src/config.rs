//! Coordinator configuration: broker identity, data directories, ISR-shrink
//! lag thresholds, and checkpoint interval.
//!
//! Loadable from JSON/YAML with extension sniffing and a JSON-then-YAML
//! fallback, mirroring [`crate::manifest::ManifestLoader`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ClusterError;
use crate::types::BrokerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub broker_id: BrokerId,
    /// Root directory for this broker's partition logs.
    pub data_dir: PathBuf,
    /// Root directory for the metadata store, when using the file backend.
    /// Defaults to `data_dir` if unset.
    pub metadata_dir: Option<PathBuf>,
    pub isr_shrink_check_interval_ms: u64,
    pub max_lag_time_ms: u64,
    pub max_lag_messages: i64,
    pub hw_checkpoint_interval_ms: u64,
}

impl CoordinatorConfig {
    pub fn new(broker_id: BrokerId, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            broker_id,
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn metadata_dir(&self) -> &Path {
        self.metadata_dir.as_deref().unwrap_or(&self.data_dir)
    }

    pub fn isr_shrink_check_interval(&self) -> Duration {
        Duration::from_millis(self.isr_shrink_check_interval_ms)
    }

    pub fn max_lag_time(&self) -> Duration {
        Duration::from_millis(self.max_lag_time_ms)
    }

    pub fn hw_checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.hw_checkpoint_interval_ms)
    }

    /// Load from a JSON or YAML file, selected by extension with a
    /// JSON-then-YAML fallback for unrecognized extensions.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ClusterError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::from_io_error(e, "coordinator config loading"))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(&content)
                .map_err(|e| ClusterError::from_parse_error(e, "JSON config parsing")),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| ClusterError::from_parse_error(e, "YAML config parsing")),
            _ => serde_json::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| {
                    ClusterError::from_parse_error(e, "config parsing (tried both JSON and YAML)")
                }),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            broker_id: BrokerId(0),
            data_dir: PathBuf::from("./data"),
            metadata_dir: None,
            isr_shrink_check_interval_ms: 5_000,
            max_lag_time_ms: 10_000,
            max_lag_messages: 4_000,
            hw_checkpoint_interval_ms: 5_000,
        }
    }
}
