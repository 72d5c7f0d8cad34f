//! Durable storage primitives for the replication coordinator: the
//! per-log-directory high watermark checkpoint and a minimal concrete log
//! manager.

pub mod dir_lock;
pub mod error;
pub mod file_io;
pub mod hw_checkpoint;
pub mod partition_log;

pub use dir_lock::DirectoryLock;
pub use error::{StorageError, abort_on_checkpoint_failure};
pub use hw_checkpoint::{HwCheckpointStore, PartitionKey};
pub use partition_log::{
    FileLogManager, FilePartitionLog, InMemoryLogManager, InMemoryPartitionLog, LogManager,
    PartitionLogHandle,
};

pub use log::{debug, error, info, trace, warn};
