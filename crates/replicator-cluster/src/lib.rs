//! Per-broker replication coordinator: leader/follower partition state
//! machine, ISR maintenance, high watermark tracking, and the
//! controller-facing request handlers that drive them.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod metadata_store;
pub mod partition;
pub mod replica;
pub mod requests;
pub mod types;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::{ClusterError, ErrorCode};
pub use fetcher::{FetcherManager, NullFetcherManager};
pub use metadata_store::{FileMetadataStore, InMemoryMetadataStore, MetadataBackend, MetadataStore};
pub use partition::{Partition, PartitionOpError, PartitionOpOutcome};
pub use replica::Replica;

pub use log::{debug, error, info, trace, warn};
